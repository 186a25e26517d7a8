//! Test backends shared by the integration suites.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mc_account_manager::{Coordinator, CoordinatorConfig};
use mc_storage_core::{
    AccountManager, AccountStorage, EntryFlags, RestrictionFlags, SetResult, StorageError,
    StorageEvent, StorageFlags, Value, ValueType,
};
use mc_storage_memory::{MemoryStorage, MemoryStorageConfig, SeedAccount};
use tokio::sync::broadcast;

/// A call the coordinator made on a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Set {
        account: String,
        key: String,
        value: Option<Value>,
    },
    Create {
        account: String,
    },
    Commit {
        account: Option<String>,
    },
}

/// `MemoryStorage` that records the calls it gets and can refuse chosen keys.
pub struct RecordingStorage {
    pub inner: MemoryStorage,
    calls: Mutex<Vec<Call>>,
    refused: Mutex<HashSet<String>>,
}

impl RecordingStorage {
    pub fn new(inner: MemoryStorage) -> Arc<Self> {
        Arc::new(Self {
            inner,
            calls: Mutex::new(Vec::new()),
            refused: Mutex::new(HashSet::new()),
        })
    }

    pub fn writable(name: &str, priority: i32) -> Arc<Self> {
        Self::new(MemoryStorage::new(MemoryStorageConfig::new(name, priority)))
    }

    pub fn read_only(name: &str, priority: i32) -> Arc<Self> {
        Self::new(MemoryStorage::new(
            MemoryStorageConfig::new(name, priority).read_only(),
        ))
    }

    pub fn seeded(config: MemoryStorageConfig, accounts: &[(&str, SeedAccount)]) -> Arc<Self> {
        let mut storage = MemoryStorage::new(config);
        for (name, seed) in accounts {
            storage = storage.with_account(name, seed.clone());
        }
        Self::new(storage)
    }

    /// Refuse to store any value (deletion is still accepted) for `key`.
    pub fn refuse(&self, key: &str) {
        self.refused.lock().unwrap().insert(key.to_string());
    }

    pub fn accept(&self, key: &str) {
        self.refused.lock().unwrap().remove(key);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Set calls for one key.
    pub fn sets_of(&self, account: &str, key: &str) -> Vec<Option<Value>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Set {
                    account: a,
                    key: k,
                    value,
                } if a == account && k == key => Some(value),
                _ => None,
            })
            .collect()
    }

    pub fn commits(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Commit { .. }))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn refuses(&self, key: &str, value: Option<&Value>) -> bool {
        value.is_some() && self.refused.lock().unwrap().contains(key)
    }
}

#[async_trait]
impl AccountStorage for RecordingStorage {
    fn priority(&self) -> i32 {
        self.inner.priority()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn provider(&self) -> &str {
        self.inner.provider()
    }

    fn flags(&self, account: &str) -> StorageFlags {
        self.inner.flags(account)
    }

    fn list(&self, am: &dyn AccountManager) -> Result<Vec<String>, StorageError> {
        self.inner.list(am)
    }

    fn get_attribute(
        &self,
        am: &dyn AccountManager,
        account: &str,
        attribute: &str,
        expected: ValueType,
    ) -> Option<Value> {
        self.inner.get_attribute(am, account, attribute, expected)
    }

    fn get_parameter(
        &self,
        am: &dyn AccountManager,
        account: &str,
        parameter: &str,
        expected: Option<ValueType>,
    ) -> Option<Value> {
        self.inner.get_parameter(am, account, parameter, expected)
    }

    fn list_typed_parameters(&self, am: &dyn AccountManager, account: &str) -> Vec<String> {
        self.inner.list_typed_parameters(am, account)
    }

    fn list_untyped_parameters(&self, am: &dyn AccountManager, account: &str) -> Vec<String> {
        self.inner.list_untyped_parameters(am, account)
    }

    fn set_attribute(
        &self,
        am: &dyn AccountManager,
        account: &str,
        attribute: &str,
        value: Option<&Value>,
        flags: EntryFlags,
    ) -> SetResult {
        self.record(Call::Set {
            account: account.to_string(),
            key: attribute.to_string(),
            value: value.cloned(),
        });
        if self.refuses(attribute, value) {
            return SetResult::Failed;
        }
        self.inner.set_attribute(am, account, attribute, value, flags)
    }

    fn set_parameter(
        &self,
        am: &dyn AccountManager,
        account: &str,
        parameter: &str,
        value: Option<&Value>,
        flags: EntryFlags,
    ) -> SetResult {
        let key = format!("param-{}", parameter);
        self.record(Call::Set {
            account: account.to_string(),
            key: key.clone(),
            value: value.cloned(),
        });
        if self.refuses(&key, value) {
            return SetResult::Failed;
        }
        self.inner.set_parameter(am, account, parameter, value, flags)
    }

    fn create(
        &self,
        am: &dyn AccountManager,
        manager: &str,
        protocol: &str,
        identification: &str,
    ) -> Result<String, StorageError> {
        let account = self.inner.create(am, manager, protocol, identification)?;
        self.record(Call::Create {
            account: account.clone(),
        });
        Ok(account)
    }

    async fn delete(&self, account: &str) -> Result<(), StorageError> {
        self.inner.delete(account).await
    }

    fn commit(&self, am: &dyn AccountManager, account: Option<&str>) -> bool {
        self.record(Call::Commit {
            account: account.map(str::to_string),
        });
        self.inner.commit(am, account)
    }

    fn identifier(&self, account: &str) -> Value {
        self.inner.identifier(account)
    }

    fn additional_info(&self, account: &str) -> HashMap<String, Value> {
        self.inner.additional_info(account)
    }

    fn restrictions(&self, account: &str) -> RestrictionFlags {
        self.inner.restrictions(account)
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<StorageEvent>> {
        self.inner.subscribe()
    }
}

/// A backend whose `list` always fails.
pub struct BrokenStorage;

#[async_trait]
impl AccountStorage for BrokenStorage {
    fn priority(&self) -> i32 {
        50
    }

    fn name(&self) -> &str {
        "broken"
    }

    fn description(&self) -> &str {
        "Cannot read its storage"
    }

    fn list(&self, _am: &dyn AccountManager) -> Result<Vec<String>, StorageError> {
        Err(StorageError::Io("permission denied".to_string()))
    }

    fn get_attribute(
        &self,
        _am: &dyn AccountManager,
        _account: &str,
        _attribute: &str,
        _expected: ValueType,
    ) -> Option<Value> {
        None
    }

    fn get_parameter(
        &self,
        _am: &dyn AccountManager,
        _account: &str,
        _parameter: &str,
        _expected: Option<ValueType>,
    ) -> Option<Value> {
        None
    }

    fn list_typed_parameters(&self, _am: &dyn AccountManager, _account: &str) -> Vec<String> {
        Vec::new()
    }
}

/// Register `backends` in order and load.
pub fn loaded(backends: &[Arc<RecordingStorage>]) -> Coordinator {
    loaded_with(CoordinatorConfig::default(), backends)
}

pub fn loaded_with(config: CoordinatorConfig, backends: &[Arc<RecordingStorage>]) -> Coordinator {
    let mut coordinator = Coordinator::new(config);
    for backend in backends {
        coordinator.register(backend.clone()).unwrap();
    }
    coordinator.load();
    coordinator
}
