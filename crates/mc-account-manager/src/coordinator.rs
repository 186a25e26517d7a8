use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use mc_storage_core::{
    known_attribute_type, AccountStorage, EntryFlags, EntryKey, RestrictionFlags, SetResult,
    StorageError, StorageEvent, Value, ValueType, KNOWN_ATTRIBUTES,
};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::config::CoordinatorConfig;
use crate::error::{AccountError, RegistryError, Result};
use crate::identity::{AccountIdentifier, ManagerContext, ParameterIdentifier};
use crate::ownership::OwnershipMap;
use crate::registry::{BackendId, BackendRegistry};

/// Outcome of the startup load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub accounts: usize,
    /// Backends whose `list` failed; they contributed nothing.
    pub failed: Vec<String>,
}

/// Which backends accepted a commit request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitReport {
    pub accepted: Vec<String>,
    pub rejected: Vec<String>,
}

impl CommitReport {
    pub fn is_accepted(&self) -> bool {
        !self.accepted.is_empty()
    }
}

/// Where and how an account is stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageInfo {
    pub provider: String,
    pub backend: String,
    pub identifier: Value,
    pub additional_info: BTreeMap<String, Value>,
    pub restrictions: RestrictionFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryView {
    pub key: String,
    pub owner: String,
    pub value: Option<Value>,
}

/// One account as currently merged from all backends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountView {
    pub account: String,
    pub storage: String,
    pub entries: Vec<EntryView>,
}

/// Routes account reads and writes across the registered backends.
///
/// Lifecycle:
/// ```text
/// register()* -> load() -> start()   (start lives in service.rs)
/// ```
/// `load` is the only phase allowed to block on backends. After `start`,
/// the coordinator is owned by a single task and every operation below runs
/// there, one at a time.
pub struct Coordinator {
    pub(crate) config: CoordinatorConfig,
    pub(crate) registry: BackendRegistry,
    pub(crate) ownership: OwnershipMap,
    pub(crate) receivers: Vec<(BackendId, broadcast::Receiver<StorageEvent>)>,
    pub(crate) identifier: Arc<dyn AccountIdentifier>,
    pub(crate) loaded: bool,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            registry: BackendRegistry::new(),
            ownership: OwnershipMap::new(),
            receivers: Vec::new(),
            identifier: Arc::new(ParameterIdentifier),
            loaded: false,
        }
    }

    /// Use `identifier` to normalize the identification of new accounts.
    pub fn with_identifier(mut self, identifier: Arc<dyn AccountIdentifier>) -> Self {
        self.identifier = identifier;
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn ownership(&self) -> &OwnershipMap {
        &self.ownership
    }

    /// Register a backend and subscribe to its signals. Signals emitted from
    /// now on are queued and processed once the service runs.
    pub fn register(
        &mut self,
        storage: Arc<dyn AccountStorage>,
    ) -> std::result::Result<BackendId, RegistryError> {
        let receiver = storage.subscribe();
        let id = self.registry.register(storage)?;
        if let Some(receiver) = receiver {
            self.receivers.push((id, receiver));
        }
        Ok(id)
    }

    // =========================================================================
    // Startup load
    // =========================================================================

    /// List every backend, lowest priority first, and merge what they hold.
    /// A key reported by several backends ends up owned by the last one, so
    /// higher priority wins, key by key.
    #[instrument(skip(self), level = "debug")]
    pub fn load(&mut self) -> LoadSummary {
        let mut summary = LoadSummary::default();

        for id in self.registry.ordered_for_read() {
            let storage = self.registry.storage(id).clone();
            let listed = storage.list(&ManagerContext::new(&self.ownership));
            let accounts = match listed {
                Ok(accounts) => accounts,
                Err(e) => {
                    warn!("Storage backend {} failed to list accounts: {}", storage.name(), e);
                    summary.failed.push(storage.name().to_string());
                    continue;
                }
            };

            debug!("{} lists {} accounts", storage.name(), accounts.len());
            for account in accounts {
                self.ownership.set_storage(&account, id);
                self.adopt_entries(id, &account);
            }
        }

        self.loaded = true;
        summary.accounts = self.ownership.len();
        info!(
            "Loaded {} accounts from {} storage backends",
            summary.accounts,
            self.registry.len()
        );
        summary
    }

    /// Make `id` the owner of every entry it currently holds for `account`.
    pub(crate) fn adopt_entries(&mut self, id: BackendId, account: &str) {
        for key in self.present_keys(id, account) {
            self.ownership.set_owner(account, key, id);
        }
    }

    fn present_keys(&self, id: BackendId, account: &str) -> Vec<EntryKey> {
        let storage = self.registry.storage(id);
        let ctx = ManagerContext::new(&self.ownership);
        let mut keys = Vec::new();

        for (attribute, expected) in KNOWN_ATTRIBUTES {
            if storage
                .get_attribute(&ctx, account, attribute, *expected)
                .is_some()
            {
                keys.push(EntryKey::attribute(*attribute));
            }
        }
        for parameter in storage.list_typed_parameters(&ctx, account) {
            if storage.get_parameter(&ctx, account, &parameter, None).is_some() {
                keys.push(EntryKey::Parameter(parameter));
            }
        }
        // Untyped values cannot be fetched without a type; being listed is enough.
        for parameter in storage.list_untyped_parameters(&ctx, account) {
            keys.push(EntryKey::Parameter(parameter));
        }
        keys
    }

    // =========================================================================
    // Read path
    // =========================================================================

    pub fn accounts(&self) -> Vec<String> {
        self.ownership.accounts().map(str::to_string).collect()
    }

    pub fn has_account(&self, account: &str) -> bool {
        self.ownership.contains_account(account)
    }

    pub fn owner(&self, account: &str, key: &EntryKey) -> Option<BackendId> {
        self.ownership.owner(account, key)
    }

    /// Name of the backend owning the key, if any.
    pub fn owner_name(&self, account: &str, key: &EntryKey) -> Option<&str> {
        self.owner(account, key).map(|id| self.registry.name(id))
    }

    /// Get an attribute from its owner, converted to `expected`. An absent
    /// key is `Ok(None)`.
    pub fn get_attribute(
        &self,
        account: &str,
        attribute: &str,
        expected: ValueType,
    ) -> Result<Option<Value>> {
        let Some(owner) = self.owner(account, &EntryKey::attribute(attribute)) else {
            return Ok(None);
        };
        let ctx = ManagerContext::new(&self.ownership);
        self.registry
            .storage(owner)
            .get_attribute(&ctx, account, attribute, expected)
            .map(|value| coerce(value, expected))
            .transpose()
    }

    /// Get a parameter from its owner. Without `expected`, only typed
    /// parameters can be returned.
    pub fn get_parameter(
        &self,
        account: &str,
        parameter: &str,
        expected: Option<ValueType>,
    ) -> Result<Option<Value>> {
        let Some(owner) = self.owner(account, &EntryKey::parameter(parameter)) else {
            return Ok(None);
        };
        let ctx = ManagerContext::new(&self.ownership);
        let Some(value) = self
            .registry
            .storage(owner)
            .get_parameter(&ctx, account, parameter, expected)
        else {
            return Ok(None);
        };
        match expected {
            Some(expected) => coerce(value, expected).map(Some),
            None => Ok(Some(value)),
        }
    }

    pub fn list_typed_parameters(&self, account: &str) -> Vec<String> {
        self.parameter_names(account).0
    }

    pub fn list_untyped_parameters(&self, account: &str) -> Vec<String> {
        self.parameter_names(account).1
    }

    /// (typed, untyped) parameter names over all backends. Typed wins when a
    /// name is reported both ways.
    fn parameter_names(&self, account: &str) -> (Vec<String>, Vec<String>) {
        let ctx = ManagerContext::new(&self.ownership);
        let mut typed = BTreeSet::new();
        let mut untyped = BTreeSet::new();

        for id in self.registry.ordered_for_read() {
            let storage = self.registry.storage(id);
            typed.extend(storage.list_typed_parameters(&ctx, account));
            untyped.extend(storage.list_untyped_parameters(&ctx, account));
        }
        untyped.retain(|name| !typed.contains(name));

        (typed.into_iter().collect(), untyped.into_iter().collect())
    }

    // =========================================================================
    // Write path
    // =========================================================================

    /// Store (`Some`) or delete (`None`) an attribute.
    #[instrument(skip(self), level = "debug")]
    pub fn set_attribute(
        &mut self,
        account: &str,
        attribute: &str,
        value: Option<&Value>,
        flags: EntryFlags,
    ) -> Result<SetResult> {
        let key = EntryKey::attribute(attribute);
        self.check_restrictions(account, &key)?;

        match (value, known_attribute_type(attribute)) {
            (Some(value), Some(expected)) if value.value_type() != expected => {
                let converted = coerce(value.clone(), expected)?;
                self.set_entry(account, key, Some(&converted), flags)
            }
            _ => self.set_entry(account, key, value, flags),
        }
    }

    /// Store (`Some`) or delete (`None`) a parameter.
    #[instrument(skip(self), level = "debug")]
    pub fn set_parameter(
        &mut self,
        account: &str,
        parameter: &str,
        value: Option<&Value>,
        flags: EntryFlags,
    ) -> Result<SetResult> {
        let key = EntryKey::parameter(parameter);
        self.check_restrictions(account, &key)?;
        self.set_entry(account, key, value, flags)
    }

    pub fn restrictions(&self, account: &str) -> RestrictionFlags {
        self.ownership
            .storage(account)
            .map(|id| self.registry.storage(id).restrictions(account))
            .unwrap_or(RestrictionFlags::NONE)
    }

    fn check_restrictions(&self, account: &str, key: &EntryKey) -> Result<()> {
        if !self.has_account(account) {
            return Err(AccountError::UnknownAccount(account.to_string()));
        }

        let restrictions = self.restrictions(account);
        let forbidden = match key {
            EntryKey::Parameter(_) => RestrictionFlags::CANNOT_SET_PARAMETERS,
            EntryKey::Attribute(name) if name == "Enabled" => RestrictionFlags::CANNOT_SET_ENABLED,
            EntryKey::Attribute(name) if name == "Service" => RestrictionFlags::CANNOT_SET_SERVICE,
            EntryKey::Attribute(_) => RestrictionFlags::NONE,
        };

        if !forbidden.is_empty() && restrictions.contains(forbidden) {
            return Err(AccountError::Restricted {
                account: account.to_string(),
                key: key.to_string(),
            });
        }
        Ok(())
    }

    /// Offer the value to each backend, highest priority first. The first to
    /// claim it owns the key; every backend after it in write order, and a
    /// displaced previous owner, is told to delete its copy.
    fn set_entry(
        &mut self,
        account: &str,
        key: EntryKey,
        value: Option<&Value>,
        flags: EntryFlags,
    ) -> Result<SetResult> {
        if !self.has_account(account) {
            return Err(AccountError::UnknownAccount(account.to_string()));
        }

        let order = self.registry.ordered_for_write();
        let previous = self.owner(account, &key);

        let mut claim = None;
        for (position, &id) in order.iter().enumerate() {
            if !self.may_store(id) {
                continue;
            }
            let result = self.store(id, account, &key, value, flags);
            if result.is_claimed() {
                claim = Some((position, id, result));
                break;
            }
            debug!("{} refused {} on {}", self.registry.name(id), key, account);
        }

        let Some((position, owner, result)) = claim else {
            warn!("No storage backend accepted {} on {}", key, account);
            return Err(AccountError::RejectedByAllBackends {
                account: account.to_string(),
                key: key.to_string(),
            });
        };

        let lower = &order[position + 1..];
        for &stale in lower {
            self.evict(stale, account, &key);
        }
        if let Some(previous) = previous {
            if previous != owner && !lower.contains(&previous) {
                self.evict(previous, account, &key);
            }
        }

        match value {
            Some(_) => {
                self.ownership.set_owner(account, key, owner);
            }
            None => {
                self.ownership.clear_owner(account, &key);
            }
        }
        Ok(result)
    }

    fn may_store(&self, id: BackendId) -> bool {
        self.registry.priority(id) >= self.config.min_write_priority
    }

    fn store(
        &self,
        id: BackendId,
        account: &str,
        key: &EntryKey,
        value: Option<&Value>,
        flags: EntryFlags,
    ) -> SetResult {
        let storage = self.registry.storage(id);
        let ctx = ManagerContext::new(&self.ownership);
        match key {
            EntryKey::Attribute(name) => storage.set_attribute(&ctx, account, name, value, flags),
            EntryKey::Parameter(name) => storage.set_parameter(&ctx, account, name, value, flags),
        }
    }

    pub(crate) fn evict(&self, id: BackendId, account: &str, key: &EntryKey) {
        let result = self.store(id, account, key, None, EntryFlags::NONE);
        if result == SetResult::Changed {
            debug!("Removed stale {} on {} from {}", key, account, self.registry.name(id));
        }
    }

    // =========================================================================
    // Create / delete / commit
    // =========================================================================

    /// Create an account in the highest-priority backend willing to. The
    /// account is not persisted until committed.
    #[instrument(skip(self), level = "debug")]
    pub fn create(&mut self, manager: &str, protocol: &str, identification: &str) -> Result<String> {
        let mut created = None;

        for id in self.registry.ordered_for_write() {
            if !self.may_store(id) {
                continue;
            }
            let storage = self.registry.storage(id);
            let ctx = ManagerContext::new(&self.ownership);
            match storage.create(&ctx, manager, protocol, identification) {
                Ok(account) if self.has_account(&account) => {
                    warn!("{} created {}, which already exists", storage.name(), account);
                }
                Ok(account) => {
                    created = Some((id, account));
                    break;
                }
                Err(e) if e.is_not_implemented() => {
                    debug!("{} cannot create accounts", storage.name());
                }
                Err(e) => {
                    warn!("{} failed to create account: {}", storage.name(), e);
                }
            }
        }

        let Some((id, account)) = created else {
            return Err(AccountError::NoBackendCanCreate {
                manager: manager.to_string(),
                protocol: protocol.to_string(),
            });
        };

        self.ownership.insert_account(&account, id);
        for (attribute, value) in [("Manager", manager), ("Protocol", protocol)] {
            if let Err(e) = self.set_entry(
                &account,
                EntryKey::attribute(attribute),
                Some(&Value::from(value)),
                EntryFlags::NONE,
            ) {
                warn!("Could not store {} of {}: {}", attribute, account, e);
            }
        }

        info!("Created account {} in {}", account, self.registry.name(id));
        Ok(account)
    }

    /// Backend responsible for deleting the account.
    pub fn begin_delete(&self, account: &str) -> Result<Arc<dyn AccountStorage>> {
        let id = self
            .ownership
            .storage(account)
            .ok_or_else(|| AccountError::UnknownAccount(account.to_string()))?;
        Ok(self.registry.storage(id).clone())
    }

    /// Apply the backend's answer to a delete. Returns whether the account
    /// was still known (it may already be gone through a `deleted` signal).
    pub fn finish_delete(
        &mut self,
        account: &str,
        result: std::result::Result<(), StorageError>,
    ) -> Result<bool> {
        if let Err(e) = result {
            warn!("Failed to delete {}: {}", account, e);
            return Err(AccountError::from_storage(e));
        }
        let removed = self.ownership.remove_account(account);
        info!("Deleted account {}", account);
        Ok(removed)
    }

    /// Delete an account and wait for its backend.
    pub async fn delete(&mut self, account: &str) -> Result<bool> {
        let storage = self.begin_delete(account)?;
        let result = storage.delete(account).await;
        self.finish_delete(account, result)
    }

    /// Ask every backend to flush one account, or everything.
    #[instrument(skip(self), level = "debug")]
    pub fn commit(&self, account: Option<&str>) -> Result<CommitReport> {
        if let Some(account) = account {
            if !self.has_account(account) {
                return Err(AccountError::UnknownAccount(account.to_string()));
            }
        }

        let ctx = ManagerContext::new(&self.ownership);
        let mut report = CommitReport::default();
        for id in self.registry.ordered_for_write() {
            let storage = self.registry.storage(id);
            if storage.commit(&ctx, account) {
                report.accepted.push(storage.name().to_string());
            } else {
                report.rejected.push(storage.name().to_string());
            }
        }

        debug!("Commit accepted by {:?}", report.accepted);
        Ok(report)
    }

    pub fn storage_info(&self, account: &str) -> Result<StorageInfo> {
        let id = self
            .ownership
            .storage(account)
            .ok_or_else(|| AccountError::UnknownAccount(account.to_string()))?;
        let storage = self.registry.storage(id);

        Ok(StorageInfo {
            provider: storage.provider().to_string(),
            backend: storage.name().to_string(),
            identifier: storage.identifier(account),
            additional_info: storage.additional_info(account).into_iter().collect(),
            restrictions: storage.restrictions(account),
        })
    }

    /// Every known account (or just `only`) with each entry's raw value and owner.
    pub fn snapshot(&self, only: Option<&str>) -> Vec<AccountView> {
        let ctx = ManagerContext::new(&self.ownership);

        self.ownership
            .accounts()
            .filter(|account| only.is_none_or(|only| only == *account))
            .map(|account| {
                let entries = self
                    .ownership
                    .entries(account)
                    .into_iter()
                    .map(|(key, id)| {
                        let storage = self.registry.storage(id);
                        let value = match &key {
                            EntryKey::Attribute(name) => storage.get_attribute(
                                &ctx,
                                account,
                                name,
                                known_attribute_type(name).unwrap_or(ValueType::String),
                            ),
                            EntryKey::Parameter(name) => {
                                storage.get_parameter(&ctx, account, name, None)
                            }
                        };
                        EntryView {
                            key: key.to_string(),
                            owner: storage.name().to_string(),
                            value,
                        }
                    })
                    .collect();

                AccountView {
                    account: account.to_string(),
                    storage: self
                        .ownership
                        .storage(account)
                        .map(|id| self.registry.name(id).to_string())
                        .unwrap_or_default(),
                    entries,
                }
            })
            .collect()
    }
}

/// Convert a stored value to the type the caller asked for.
fn coerce(value: Value, expected: ValueType) -> Result<Value> {
    let actual = value.value_type();
    if actual == expected {
        return Ok(value);
    }
    value
        .coerce(expected)
        .ok_or(AccountError::TypeMismatch { expected, actual })
}
