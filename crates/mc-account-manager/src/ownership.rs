use std::collections::BTreeMap;

use mc_storage_core::EntryKey;

use crate::registry::BackendId;

#[derive(Debug, Clone)]
struct AccountOwnership {
    /// Backend that stores the account itself: answers delete, restrictions
    /// and storage info.
    storage: BackendId,
    entries: BTreeMap<EntryKey, BackendId>,
}

/// Which backend persists each (account, key).
///
/// An account can exist with no entries; an entry without an owner does not
/// exist. Each key maps to exactly one backend.
#[derive(Debug, Clone, Default)]
pub struct OwnershipMap {
    accounts: BTreeMap<String, AccountOwnership>,
}

impl OwnershipMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account stored by `storage`. Returns false if it was already known.
    pub fn insert_account(&mut self, account: &str, storage: BackendId) -> bool {
        if self.accounts.contains_key(account) {
            return false;
        }
        self.accounts.insert(
            account.to_string(),
            AccountOwnership {
                storage,
                entries: BTreeMap::new(),
            },
        );
        true
    }

    /// Make `storage` the account's storage backend, adding the account if needed.
    pub fn set_storage(&mut self, account: &str, storage: BackendId) {
        self.accounts
            .entry(account.to_string())
            .and_modify(|a| a.storage = storage)
            .or_insert_with(|| AccountOwnership {
                storage,
                entries: BTreeMap::new(),
            });
    }

    pub fn storage(&self, account: &str) -> Option<BackendId> {
        self.accounts.get(account).map(|a| a.storage)
    }

    /// Drop the account and all its entries.
    pub fn remove_account(&mut self, account: &str) -> bool {
        self.accounts.remove(account).is_some()
    }

    pub fn contains_account(&self, account: &str) -> bool {
        self.accounts.contains_key(account)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &str> {
        self.accounts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn owner(&self, account: &str, key: &EntryKey) -> Option<BackendId> {
        self.accounts
            .get(account)
            .and_then(|a| a.entries.get(key).copied())
    }

    /// Record `owner` for the key, returning the previous owner. Ignored for
    /// unknown accounts.
    pub fn set_owner(
        &mut self,
        account: &str,
        key: EntryKey,
        owner: BackendId,
    ) -> Option<BackendId> {
        self.accounts
            .get_mut(account)
            .and_then(|a| a.entries.insert(key, owner))
    }

    pub fn clear_owner(&mut self, account: &str, key: &EntryKey) -> Option<BackendId> {
        self.accounts
            .get_mut(account)
            .and_then(|a| a.entries.remove(key))
    }

    /// Entries of one account with their owners, in key order.
    pub fn entries(&self, account: &str) -> Vec<(EntryKey, BackendId)> {
        self.accounts
            .get(account)
            .map(|a| a.entries.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default()
    }
}
