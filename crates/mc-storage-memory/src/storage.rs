use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use mc_storage_core::{
    AccountManager, AccountStorage, EntryFlags, RestrictionFlags, SetResult, StorageError,
    StorageEvent, StorageFlags, StorageSignals, Value, ValueType, PARAMETER_PREFIX,
};
use tokio::sync::broadcast;
use tracing::{debug, instrument, warn};

use crate::config::{MemoryStorageConfig, SeedAccount, SeedFile};

#[derive(Debug, Clone, PartialEq)]
enum StoredParameter {
    Typed(Value),
    /// Escaped form; interpreting it needs a type hint.
    Untyped(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Stored<T> {
    value: T,
    flags: EntryFlags,
}

/// State for one account.
#[derive(Debug, Clone, Default)]
struct StoredAccount {
    attributes: BTreeMap<String, Stored<Value>>,
    parameters: BTreeMap<String, Stored<StoredParameter>>,
    /// Changed since the last commit
    dirty: bool,
}

impl From<SeedAccount> for StoredAccount {
    fn from(seed: SeedAccount) -> Self {
        let mut account = StoredAccount::default();
        for (name, value) in seed.attributes {
            account.attributes.insert(
                name,
                Stored {
                    value,
                    flags: EntryFlags::NONE,
                },
            );
        }
        for (name, value) in seed.parameters {
            account.parameters.insert(
                name,
                Stored {
                    value: StoredParameter::Typed(value),
                    flags: EntryFlags::NONE,
                },
            );
        }
        for (name, escaped) in seed.untyped_parameters {
            account.parameters.insert(
                name,
                Stored {
                    value: StoredParameter::Untyped(escaped),
                    flags: EntryFlags::NONE,
                },
            );
        }
        account
    }
}

/// In-memory account storage backend.
///
/// Accounts live in two maps:
/// ```text
/// committed  -- "long-term storage": seeded content, updated by commit()
/// accounts   -- the working cache: filled by list(), mutated by set_*()
/// ```
/// Out-of-band changes (`external_*`) update both maps and then emit the
/// matching signal, as an independent writer of the same storage would.
#[derive(Debug)]
pub struct MemoryStorage {
    config: MemoryStorageConfig,
    accounts: DashMap<String, StoredAccount>,
    committed: DashMap<String, StoredAccount>,
    /// Unix timestamp of the last commit, per account
    committed_at: DashMap<String, i64>,
    commit_calls: AtomicU64,
    signals: StorageSignals,
}

impl MemoryStorage {
    pub fn new(config: MemoryStorageConfig) -> Self {
        let signals = StorageSignals::new(config.name.clone());
        Self {
            config,
            accounts: DashMap::new(),
            committed: DashMap::new(),
            committed_at: DashMap::new(),
            commit_calls: AtomicU64::new(0),
            signals,
        }
    }

    /// Add an account to long-term storage. It becomes visible through
    /// `list()`; no signal is emitted.
    pub fn with_account(self, account: &str, seed: SeedAccount) -> Self {
        self.committed.insert(account.to_string(), seed.into());
        self
    }

    pub fn from_seed(seed: SeedFile) -> Self {
        let mut storage = Self::new(seed.config);
        for (account, content) in seed.accounts {
            storage = storage.with_account(&account, content);
        }
        storage
    }

    pub fn from_seed_file(path: &Path) -> Result<Self, StorageError> {
        let seed = SeedFile::from_path(path)?;
        debug!(
            "Loaded seed {} ({} accounts) from {}",
            seed.config.name,
            seed.accounts.len(),
            path.display()
        );
        Ok(Self::from_seed(seed))
    }

    pub fn config(&self) -> &MemoryStorageConfig {
        &self.config
    }

    fn writable(&self) -> bool {
        !self.config.read_only
    }

    /// Value of an attribute as last committed.
    pub fn committed_attribute(&self, account: &str, attribute: &str) -> Option<Value> {
        self.committed
            .get(account)
            .and_then(|a| a.attributes.get(attribute).map(|s| s.value.clone()))
    }

    /// Whether long-term storage knows the account at all.
    pub fn is_committed(&self, account: &str) -> bool {
        self.committed.contains_key(account)
    }

    pub fn is_dirty(&self, account: &str) -> bool {
        self.accounts.get(account).map(|a| a.dirty).unwrap_or(false)
    }

    pub fn last_committed_at(&self, account: &str) -> Option<i64> {
        self.committed_at.get(account).map(|t| *t)
    }

    /// Number of accepted commit requests.
    pub fn commit_count(&self) -> u64 {
        self.commit_calls.load(Ordering::SeqCst)
    }

    /// Flags the entry was stored with, if present in the cache.
    pub fn entry_flags(&self, account: &str, key: &str) -> Option<EntryFlags> {
        let stored = self.accounts.get(account)?;
        match key.strip_prefix(PARAMETER_PREFIX) {
            Some(param) => stored.parameters.get(param).map(|s| s.flags),
            None => stored.attributes.get(key).map(|s| s.flags),
        }
    }

    // =========================================================================
    // Out-of-band changes
    // =========================================================================

    /// Another writer created an account.
    pub fn external_create(&self, account: &str, seed: SeedAccount) {
        let stored: StoredAccount = seed.into();
        self.committed.insert(account.to_string(), stored.clone());
        self.accounts.insert(account.to_string(), stored);
        self.signals.emit_created(account);
    }

    /// Another writer changed an attribute.
    pub fn external_set_attribute(&self, account: &str, attribute: &str, value: Value) {
        for map in [&self.committed, &self.accounts] {
            map.entry(account.to_string()).or_default().attributes.insert(
                attribute.to_string(),
                Stored {
                    value: value.clone(),
                    flags: EntryFlags::NONE,
                },
            );
        }
        self.signals.emit_altered_one(account, attribute);
    }

    /// Another writer changed a typed parameter.
    pub fn external_set_parameter(&self, account: &str, parameter: &str, value: Value) {
        for map in [&self.committed, &self.accounts] {
            map.entry(account.to_string()).or_default().parameters.insert(
                parameter.to_string(),
                Stored {
                    value: StoredParameter::Typed(value.clone()),
                    flags: EntryFlags::NONE,
                },
            );
        }
        self.signals
            .emit_altered_one(account, &format!("{}{}", PARAMETER_PREFIX, parameter));
    }

    /// Another writer enabled or disabled an account.
    pub fn external_toggle(&self, account: &str, enabled: bool) {
        for map in [&self.committed, &self.accounts] {
            map.entry(account.to_string()).or_default().attributes.insert(
                "Enabled".to_string(),
                Stored {
                    value: Value::Boolean(enabled),
                    flags: EntryFlags::NONE,
                },
            );
        }
        self.signals.emit_toggled(account, enabled);
    }

    /// Another writer deleted an account.
    pub fn external_delete(&self, account: &str) {
        self.committed.remove(account);
        self.accounts.remove(account);
        self.signals.emit_deleted(account);
    }

    /// Ask for the account to reconnect after an important change.
    pub fn request_reconnect(&self, account: &str) {
        self.signals.emit_reconnect(account);
    }

    fn commit_one(&self, account: &str) {
        let Some(mut cached) = self.accounts.get_mut(account) else {
            return;
        };
        cached.dirty = false;
        let snapshot = cached.clone();
        drop(cached);
        self.committed.insert(account.to_string(), snapshot);
        self.committed_at
            .insert(account.to_string(), chrono::Utc::now().timestamp());
    }
}

#[async_trait]
impl AccountStorage for MemoryStorage {
    fn priority(&self) -> i32 {
        self.config.priority
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    fn provider(&self) -> &str {
        &self.config.provider
    }

    fn flags(&self, _account: &str) -> StorageFlags {
        if self.config.stores_types {
            StorageFlags::STORES_TYPES
        } else {
            StorageFlags::NONE
        }
    }

    #[instrument(skip(self, _am), level = "debug", fields(storage = %self.config.name))]
    fn list(&self, _am: &dyn AccountManager) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::with_capacity(self.committed.len());
        for entry in self.committed.iter() {
            let (name, stored) = entry.pair();
            self.accounts
                .entry(name.clone())
                .or_insert_with(|| stored.clone());
            names.push(name.clone());
        }
        names.sort();

        debug!("Listed {} accounts", names.len());
        Ok(names)
    }

    fn get_attribute(
        &self,
        _am: &dyn AccountManager,
        account: &str,
        attribute: &str,
        _expected: ValueType,
    ) -> Option<Value> {
        self.accounts
            .get(account)
            .and_then(|a| a.attributes.get(attribute).map(|s| s.value.clone()))
    }

    fn get_parameter(
        &self,
        am: &dyn AccountManager,
        account: &str,
        parameter: &str,
        expected: Option<ValueType>,
    ) -> Option<Value> {
        let stored = self
            .accounts
            .get(account)
            .and_then(|a| a.parameters.get(parameter).map(|s| s.value.clone()))?;

        match stored {
            StoredParameter::Typed(value) => Some(value),
            StoredParameter::Untyped(escaped) => {
                let expected = expected?;
                match am.unescape_value(&escaped, expected) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        warn!(
                            "{}: cannot read {}.{} as {}: {}",
                            self.config.name, account, parameter, expected, e
                        );
                        None
                    }
                }
            }
        }
    }

    fn list_typed_parameters(&self, _am: &dyn AccountManager, account: &str) -> Vec<String> {
        self.accounts
            .get(account)
            .map(|a| {
                a.parameters
                    .iter()
                    .filter(|(_, s)| matches!(s.value, StoredParameter::Typed(_)))
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn list_untyped_parameters(&self, _am: &dyn AccountManager, account: &str) -> Vec<String> {
        self.accounts
            .get(account)
            .map(|a| {
                a.parameters
                    .iter()
                    .filter(|(_, s)| matches!(s.value, StoredParameter::Untyped(_)))
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[instrument(skip(self, _am), level = "debug", fields(storage = %self.config.name))]
    fn set_attribute(
        &self,
        _am: &dyn AccountManager,
        account: &str,
        attribute: &str,
        value: Option<&Value>,
        flags: EntryFlags,
    ) -> SetResult {
        if !self.writable() {
            return SetResult::Failed;
        }

        let Some(value) = value else {
            let Some(mut stored) = self.accounts.get_mut(account) else {
                return SetResult::Unchanged;
            };
            if stored.attributes.remove(attribute).is_none() {
                return SetResult::Unchanged;
            }
            stored.dirty = true;
            return SetResult::Changed;
        };

        let mut stored = self.accounts.entry(account.to_string()).or_default();
        let new = Stored {
            value: value.clone(),
            flags,
        };
        if stored.attributes.get(attribute) == Some(&new) {
            return SetResult::Unchanged;
        }
        stored.attributes.insert(attribute.to_string(), new);
        stored.dirty = true;
        SetResult::Changed
    }

    #[instrument(skip(self, am), level = "debug", fields(storage = %self.config.name))]
    fn set_parameter(
        &self,
        am: &dyn AccountManager,
        account: &str,
        parameter: &str,
        value: Option<&Value>,
        flags: EntryFlags,
    ) -> SetResult {
        if !self.writable() {
            return SetResult::Failed;
        }

        let Some(value) = value else {
            let Some(mut stored) = self.accounts.get_mut(account) else {
                return SetResult::Unchanged;
            };
            if stored.parameters.remove(parameter).is_none() {
                return SetResult::Unchanged;
            }
            stored.dirty = true;
            return SetResult::Changed;
        };

        let new = Stored {
            value: if self.config.stores_types {
                StoredParameter::Typed(value.clone())
            } else {
                StoredParameter::Untyped(am.escape_value(value))
            },
            flags,
        };

        let mut stored = self.accounts.entry(account.to_string()).or_default();
        if stored.parameters.get(parameter) == Some(&new) {
            return SetResult::Unchanged;
        }
        stored.parameters.insert(parameter.to_string(), new);
        stored.dirty = true;
        SetResult::Changed
    }

    #[instrument(skip(self, am), level = "debug", fields(storage = %self.config.name))]
    fn create(
        &self,
        am: &dyn AccountManager,
        manager: &str,
        protocol: &str,
        identification: &str,
    ) -> Result<String, StorageError> {
        if !self.writable() || !self.config.can_create {
            return Err(StorageError::NotImplemented(format!(
                "{} cannot create accounts",
                self.config.name
            )));
        }

        let account = am.unique_name(manager, protocol, identification);
        if self.accounts.contains_key(&account) || self.committed.contains_key(&account) {
            return Err(StorageError::Rejected(format!(
                "{} already stores an account named {}",
                self.config.name, account
            )));
        }

        self.accounts.insert(
            account.clone(),
            StoredAccount {
                dirty: true,
                ..Default::default()
            },
        );
        debug!("Created account {}", account);
        Ok(account)
    }

    #[instrument(skip(self), level = "debug", fields(storage = %self.config.name))]
    async fn delete(&self, account: &str) -> Result<(), StorageError> {
        if !self.writable() || !self.config.can_delete {
            return Err(StorageError::NotImplemented(format!(
                "{} cannot delete accounts",
                self.config.name
            )));
        }

        // Deletion goes straight to long-term storage.
        tokio::task::yield_now().await;

        let cached = self.accounts.remove(account).is_some();
        let committed = self.committed.remove(account).is_some();
        self.committed_at.remove(account);
        if !cached && !committed {
            return Err(StorageError::NotFound(format!(
                "{} has no account {}",
                self.config.name, account
            )));
        }

        self.signals.emit_deleted(account);
        Ok(())
    }

    #[instrument(skip(self, _am), level = "debug", fields(storage = %self.config.name))]
    fn commit(&self, _am: &dyn AccountManager, account: Option<&str>) -> bool {
        if !self.writable() {
            return false;
        }

        match account {
            Some(account) => self.commit_one(account),
            None => {
                let names: Vec<String> = self.accounts.iter().map(|e| e.key().clone()).collect();
                for name in names {
                    self.commit_one(&name);
                }
            }
        }

        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn additional_info(&self, account: &str) -> HashMap<String, Value> {
        let mut info = HashMap::new();
        info.insert(
            "Storage".to_string(),
            Value::String(self.config.name.clone()),
        );
        if let Some(at) = self.last_committed_at(account) {
            info.insert("CommittedAt".to_string(), Value::Int64(at));
        }
        info
    }

    fn restrictions(&self, _account: &str) -> RestrictionFlags {
        self.config.restrictions
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<StorageEvent>> {
        Some(self.signals.subscribe())
    }
}
