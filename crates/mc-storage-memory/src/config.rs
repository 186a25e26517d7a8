use std::collections::BTreeMap;
use std::path::Path;

use mc_storage_core::{RestrictionFlags, StorageError, Value, PRIORITY_DEFAULT};
use serde::{Deserialize, Serialize};

/// Identity and capabilities of one `MemoryStorage` instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStorageConfig {
    #[serde(default = "default_priority")]
    pub priority: i32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub provider: String,
    /// Refuse every set, create, delete and commit.
    #[serde(default)]
    pub read_only: bool,
    /// Keep parameter types; otherwise parameters are stored escaped, untyped.
    #[serde(default = "default_true")]
    pub stores_types: bool,
    #[serde(default = "default_true")]
    pub can_create: bool,
    #[serde(default = "default_true")]
    pub can_delete: bool,
    #[serde(default)]
    pub restrictions: RestrictionFlags,
}

fn default_priority() -> i32 {
    PRIORITY_DEFAULT
}

fn default_true() -> bool {
    true
}

impl MemoryStorageConfig {
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        let name = name.into();
        Self {
            priority,
            description: format!("In-memory storage '{}'", name),
            name,
            provider: String::new(),
            read_only: false,
            stores_types: true,
            can_create: true,
            can_delete: true,
            restrictions: RestrictionFlags::NONE,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn untyped(mut self) -> Self {
        self.stores_types = false;
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn without_create(mut self) -> Self {
        self.can_create = false;
        self
    }

    pub fn restrictions(mut self, restrictions: RestrictionFlags) -> Self {
        self.restrictions = restrictions;
        self
    }
}

/// Initial content of one account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedAccount {
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    /// Parameters stored with their type.
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    /// Legacy parameters, already in escaped form.
    #[serde(default)]
    pub untyped_parameters: BTreeMap<String, String>,
}

impl SeedAccount {
    pub fn attribute(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn parameter(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    pub fn untyped_parameter(mut self, name: &str, escaped: &str) -> Self {
        self.untyped_parameters
            .insert(name.to_string(), escaped.to_string());
        self
    }
}

/// A JSON seed file: one backend and the accounts it starts with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedFile {
    #[serde(flatten)]
    pub config: MemoryStorageConfig,
    #[serde(default)]
    pub accounts: BTreeMap<String, SeedAccount>,
}

impl SeedFile {
    pub fn from_path(path: &Path) -> Result<Self, StorageError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            StorageError::Io(format!("Failed to read seed file {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            StorageError::InvalidValue(format!("Invalid seed file {}: {}", path.display(), e))
        })
    }
}
