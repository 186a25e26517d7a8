use std::fmt;
use std::sync::Arc;

use mc_storage_core::AccountStorage;
use serde::Serialize;
use tracing::info;

use crate::error::RegistryError;

/// Index of a backend in the registry, assigned at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BackendId(usize);

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the registry remembers about a backend. Captured once: a backend
/// must not change its priority after registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendDescriptor {
    pub priority: i32,
    pub name: String,
    pub description: String,
    pub provider: String,
}

struct Registered {
    storage: Arc<dyn AccountStorage>,
    descriptor: BackendDescriptor,
}

/// Ordered collection of storage backends.
#[derive(Default)]
pub struct BackendRegistry {
    backends: Vec<Registered>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a backend. Registering the same instance twice is an error.
    pub fn register(
        &mut self,
        storage: Arc<dyn AccountStorage>,
    ) -> Result<BackendId, RegistryError> {
        if self
            .backends
            .iter()
            .any(|r| Arc::ptr_eq(&r.storage, &storage))
        {
            return Err(RegistryError::DuplicateBackend(storage.name().to_string()));
        }

        let descriptor = BackendDescriptor {
            priority: storage.priority(),
            name: storage.name().to_string(),
            description: storage.description().to_string(),
            provider: storage.provider().to_string(),
        };
        info!(
            "Registered storage backend {} (priority {})",
            descriptor.name, descriptor.priority
        );

        let id = BackendId(self.backends.len());
        self.backends.push(Registered {
            storage,
            descriptor,
        });
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Backend behind an id minted by this registry.
    pub fn storage(&self, id: BackendId) -> &Arc<dyn AccountStorage> {
        &self.backends[id.0].storage
    }

    pub fn descriptor(&self, id: BackendId) -> Option<&BackendDescriptor> {
        self.backends.get(id.0).map(|r| &r.descriptor)
    }

    pub fn priority(&self, id: BackendId) -> i32 {
        self.descriptor(id).map(|d| d.priority).unwrap_or(i32::MIN)
    }

    pub fn name(&self, id: BackendId) -> &str {
        self.descriptor(id).map(|d| d.name.as_str()).unwrap_or("<unknown>")
    }

    /// Registration order.
    pub fn ids(&self) -> impl Iterator<Item = BackendId> + '_ {
        (0..self.backends.len()).map(BackendId)
    }

    /// Lowest priority first. Equal priorities keep registration order.
    pub fn ordered_for_read(&self) -> Vec<BackendId> {
        let mut ids: Vec<BackendId> = self.ids().collect();
        ids.sort_by_key(|id| self.priority(*id));
        ids
    }

    /// Exact reverse of [`Self::ordered_for_read`], so the backend whose
    /// value survives a load is also offered writes first. Among equal
    /// priorities the later-registered backend comes first.
    pub fn ordered_for_write(&self) -> Vec<BackendId> {
        let mut ids = self.ordered_for_read();
        ids.reverse();
        ids
    }
}
