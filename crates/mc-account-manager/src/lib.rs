//! Account manager core: one logical account store over several storage
//! backends.
//!
//! - `BackendRegistry` orders backends by priority
//! - `Coordinator` loads, merges and routes reads and writes, tracking which
//!   backend owns each (account, key) in an `OwnershipMap`
//! - `Coordinator::start` moves it onto a single task reached through an
//!   `AccountManagerHandle`, which also relays backend signals as
//!   `AccountEvent`s

pub mod config;
pub mod coordinator;
pub mod error;
pub mod identity;
pub mod ownership;
pub mod registry;
pub mod relay;
pub mod service;

pub use config::{Config, CoordinatorConfig};
pub use coordinator::{AccountView, CommitReport, Coordinator, EntryView, LoadSummary, StorageInfo};
pub use error::{AccountError, RegistryError, Result};
pub use identity::{escape_as_identifier, unique_name, AccountIdentifier, ParameterIdentifier};
pub use ownership::OwnershipMap;
pub use registry::{BackendDescriptor, BackendId, BackendRegistry};
pub use relay::AccountEvent;
pub use service::AccountManagerHandle;
