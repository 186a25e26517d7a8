use mc_storage_core::{EntryKey, StorageEvent};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::coordinator::Coordinator;
use crate::registry::BackendId;

/// Change notifications the account manager sends to its own clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum AccountEvent {
    Created { account: String },
    Altered { account: String, key: EntryKey },
    Toggled { account: String, enabled: bool },
    Removed { account: String },
    Reconnect { account: String },
}

impl AccountEvent {
    pub fn account(&self) -> &str {
        match self {
            AccountEvent::Created { account }
            | AccountEvent::Altered { account, .. }
            | AccountEvent::Toggled { account, .. }
            | AccountEvent::Removed { account }
            | AccountEvent::Reconnect { account } => account,
        }
    }
}

impl Coordinator {
    /// Fold a backend signal into the ownership map and return the event to
    /// pass on, if any. The backend already holds the new state, so nothing
    /// is re-read here beyond discovering which keys a new account has.
    pub fn handle_signal(&mut self, source: BackendId, event: StorageEvent) -> Option<AccountEvent> {
        let backend = self.registry.name(source).to_string();

        match event {
            StorageEvent::Created { account } => {
                if !self.ownership.insert_account(&account, source) {
                    debug!("{}: {} already known", backend, account);
                    return None;
                }
                self.adopt_entries(source, &account);
                info!("{} reported new account {}", backend, account);
                Some(AccountEvent::Created { account })
            }

            StorageEvent::AlteredOne { account, key } => {
                let key = EntryKey::from_signal_key(&key);
                if !self.take_over(source, &account, &key) {
                    return None;
                }
                Some(AccountEvent::Altered { account, key })
            }

            StorageEvent::Toggled { account, enabled } => {
                if !self.take_over(source, &account, &EntryKey::attribute("Enabled")) {
                    return None;
                }
                Some(AccountEvent::Toggled { account, enabled })
            }

            StorageEvent::Deleted { account } => {
                if !self.ownership.remove_account(&account) {
                    debug!("{}: deleted account {} was not known", backend, account);
                    return None;
                }
                info!("{} deleted account {}", backend, account);
                Some(AccountEvent::Removed { account })
            }

            StorageEvent::Reconnect { account } => {
                if !self.ownership.contains_account(&account) {
                    debug!("{}: reconnect for unknown account {}", backend, account);
                    return None;
                }
                Some(AccountEvent::Reconnect { account })
            }
        }
    }

    /// Let `source` own the key after it changed it, unless a backend of
    /// higher priority owns it. The displaced owner loses its copy, as on a
    /// write. Returns whether the change is visible.
    fn take_over(&mut self, source: BackendId, account: &str, key: &EntryKey) -> bool {
        if !self.ownership.contains_account(account) {
            debug!(
                "{}: ignoring change of {} on unknown account {}",
                self.registry.name(source),
                key,
                account
            );
            return false;
        }

        let previous = self.ownership.owner(account, key);
        if let Some(owner) = previous {
            if owner != source && self.registry.priority(owner) > self.registry.priority(source) {
                warn!(
                    "{} changed {} on {}, but {} has higher priority; ignoring",
                    self.registry.name(source),
                    key,
                    account,
                    self.registry.name(owner)
                );
                return false;
            }
        }

        self.ownership.set_owner(account, key.clone(), source);
        if let Some(previous) = previous.filter(|p| *p != source) {
            self.evict(previous, account, key);
        }
        true
    }
}
