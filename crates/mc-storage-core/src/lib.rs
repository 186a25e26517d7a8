//! Core traits and types for account storage backends.
//!
//! This crate defines the abstractions shared between the account manager and
//! the storage plugins it coordinates:
//! - `AccountStorage`: the contract every storage backend implements
//! - `AccountManager`: the callbacks a backend may use (unique names, escaping)
//! - `StorageSignals`: out-of-band change notifications from a backend
//! - `Value` / `ValueType`: the typed values stored for attributes and parameters
//! - `escape`: the flat key-file serialization used by backends that need it

mod entry;
mod error;
pub mod escape;
mod flags;
mod manager;
mod signals;
mod storage;
mod value;

pub use entry::{known_attribute_type, EntryKey, KNOWN_ATTRIBUTES, PARAMETER_PREFIX};
pub use error::{EscapeError, StorageError};
pub use flags::{EntryFlags, RestrictionFlags, StorageFlags};
pub use manager::AccountManager;
pub use signals::{StorageEvent, StorageSignals};
pub use storage::{
    has_all_flags, has_any_flag, AccountStorage, SetResult, PRIORITY_DEFAULT, PRIORITY_KEYRING,
    PRIORITY_NORMAL, PRIORITY_READONLY,
};
pub use value::{ObjectPath, Value, ValueType};
