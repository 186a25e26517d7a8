use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::StorageError;
use crate::flags::{EntryFlags, RestrictionFlags, StorageFlags};
use crate::manager::AccountManager;
use crate::signals::StorageEvent;
use crate::value::{Value, ValueType};

/// Backends below the default priority are never asked to store anything.
pub const PRIORITY_READONLY: i32 = -1;
/// Priority of the default (key-file) storage.
pub const PRIORITY_DEFAULT: i32 = 0;
pub const PRIORITY_NORMAL: i32 = 100;
pub const PRIORITY_KEYRING: i32 = 10000;

/// Outcome of asking a backend to store (or delete) one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetResult {
    /// Claimed, and the stored value changed.
    Changed,
    /// Claimed, but the backend already held exactly this value.
    Unchanged,
    /// Not claimed: the backend cannot or will not store it.
    Failed,
}

impl SetResult {
    pub fn is_claimed(self) -> bool {
        !matches!(self, SetResult::Failed)
    }
}

/// Contract implemented by every account storage backend.
///
/// Apart from `list`, which runs once at startup and may block, every method
/// must answer promptly from the backend's in-memory cache. Long-term storage
/// is only written by `commit` and `delete`.
///
/// The defaults describe a read-only backend: sets fail, create and delete are
/// not implemented, commit is refused.
#[async_trait]
pub trait AccountStorage: Send + Sync {
    /// Higher numbers are higher priority. Must not change after registration.
    fn priority(&self) -> i32;

    /// Short name, for logging.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Namespaced provider name, or "" if none.
    fn provider(&self) -> &str {
        ""
    }

    fn flags(&self, _account: &str) -> StorageFlags {
        StorageFlags::NONE
    }

    /// Load every account this backend stores into its cache and return
    /// their unique names. Called once, at startup, and allowed to block.
    fn list(&self, am: &dyn AccountManager) -> Result<Vec<String>, StorageError>;

    /// Get an attribute from the cache. The returned value may have a type
    /// other than `expected`; the caller converts it.
    fn get_attribute(
        &self,
        am: &dyn AccountManager,
        account: &str,
        attribute: &str,
        expected: ValueType,
    ) -> Option<Value>;

    /// Get a parameter from the cache. With `expected == None`, only a
    /// parameter whose type is stored can be returned.
    fn get_parameter(
        &self,
        am: &dyn AccountManager,
        account: &str,
        parameter: &str,
        expected: Option<ValueType>,
    ) -> Option<Value>;

    /// Names of parameters whose type is stored alongside the value.
    fn list_typed_parameters(&self, am: &dyn AccountManager, account: &str) -> Vec<String>;

    /// Names of parameters stored without a type.
    fn list_untyped_parameters(&self, _am: &dyn AccountManager, _account: &str) -> Vec<String> {
        Vec::new()
    }

    /// Store (`Some`) or delete (`None`) an attribute in the cache, or decline.
    fn set_attribute(
        &self,
        _am: &dyn AccountManager,
        _account: &str,
        _attribute: &str,
        _value: Option<&Value>,
        _flags: EntryFlags,
    ) -> SetResult {
        SetResult::Failed
    }

    /// Store (`Some`) or delete (`None`) a parameter in the cache, or decline.
    fn set_parameter(
        &self,
        _am: &dyn AccountManager,
        _account: &str,
        _parameter: &str,
        _value: Option<&Value>,
        _flags: EntryFlags,
    ) -> SetResult {
        SetResult::Failed
    }

    /// Accept a new account and return its unique name.
    ///
    /// Nothing is persisted until `commit`, and no `Created` signal may be
    /// emitted for an account created this way.
    fn create(
        &self,
        _am: &dyn AccountManager,
        _manager: &str,
        _protocol: &str,
        _identification: &str,
    ) -> Result<String, StorageError> {
        Err(StorageError::NotImplemented(
            "This storage does not implement create()".to_string(),
        ))
    }

    /// Delete an account, commit the deletion and emit `Deleted`.
    async fn delete(&self, _account: &str) -> Result<(), StorageError> {
        Err(StorageError::NotImplemented(
            "This storage plugin cannot delete accounts".to_string(),
        ))
    }

    /// Start writing the cache to long-term storage, for one account or for
    /// all of them. Returns whether the commit was started.
    fn commit(&self, _am: &dyn AccountManager, _account: Option<&str>) -> bool {
        false
    }

    /// Storage-specific identifier of the account.
    fn identifier(&self, account: &str) -> Value {
        Value::String(account.to_string())
    }

    /// Storage-specific information, not interpreted by the account manager.
    fn additional_info(&self, _account: &str) -> HashMap<String, Value> {
        HashMap::new()
    }

    fn restrictions(&self, _account: &str) -> RestrictionFlags {
        RestrictionFlags::NONE
    }

    /// Subscribe to this backend's out-of-band change signals, if it has any.
    fn subscribe(&self) -> Option<broadcast::Receiver<StorageEvent>> {
        None
    }
}

/// Whether the backend reports every flag in `require_all` for `account`.
pub fn has_all_flags(storage: &dyn AccountStorage, account: &str, require_all: StorageFlags) -> bool {
    storage.flags(account).contains(require_all)
}

/// Whether the backend reports at least one flag in `require_one` for `account`.
pub fn has_any_flag(storage: &dyn AccountStorage, account: &str, require_one: StorageFlags) -> bool {
    storage.flags(account).intersects(require_one)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ReadOnly;

    struct Names;

    impl AccountManager for Names {
        fn unique_name(&self, manager: &str, protocol: &str, identification: &str) -> String {
            format!("{}/{}/{}", manager, protocol, identification)
        }
    }

    #[async_trait]
    impl AccountStorage for ReadOnly {
        fn priority(&self) -> i32 {
            PRIORITY_READONLY
        }

        fn name(&self) -> &str {
            "read-only"
        }

        fn description(&self) -> &str {
            "fixture"
        }

        fn list(&self, _am: &dyn AccountManager) -> Result<Vec<String>, StorageError> {
            Ok(vec!["a/b/c0".to_string()])
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

    #[tokio::test]
    async fn test_read_only_defaults() {
        let storage = ReadOnly;
        let am = Names;

        assert_eq!(
            storage.set_attribute(&am, "a/b/c0", "Enabled", Some(&Value::Boolean(true)), EntryFlags::NONE),
            SetResult::Failed
        );
        assert_eq!(
            storage.set_parameter(&am, "a/b/c0", "account", None, EntryFlags::NONE),
            SetResult::Failed
        );
        assert!(storage
            .create(&am, "a", "b", "c")
            .unwrap_err()
            .is_not_implemented());
        assert!(storage.delete("a/b/c0").await.unwrap_err().is_not_implemented());
        assert!(!storage.commit(&am, None));
        assert!(storage.list_untyped_parameters(&am, "a/b/c0").is_empty());
        assert_eq!(storage.identifier("a/b/c0"), Value::String("a/b/c0".into()));
        assert!(storage.additional_info("a/b/c0").is_empty());
        assert!(storage.restrictions("a/b/c0").is_empty());
        assert_eq!(storage.provider(), "");
        assert!(storage.subscribe().is_none());
    }

    #[test]
    fn test_flag_helpers() {
        let storage = ReadOnly;
        assert!(has_all_flags(&storage, "a/b/c0", StorageFlags::NONE));
        assert!(!has_all_flags(&storage, "a/b/c0", StorageFlags::STORES_TYPES));
        assert!(!has_any_flag(&storage, "a/b/c0", StorageFlags::NONE));
    }

    #[test]
    fn test_set_result_claims() {
        assert!(SetResult::Changed.is_claimed());
        assert!(SetResult::Unchanged.is_claimed());
        assert!(!SetResult::Failed.is_claimed());
    }
}
