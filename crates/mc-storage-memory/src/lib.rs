//! In-memory account storage backend.
//!
//! `MemoryStorage` keeps a working cache and a separate "committed" copy that
//! stands in for long-term storage. It can be seeded from a JSON file and can
//! simulate changes made behind the account manager's back, emitting the
//! matching signals.

mod config;
mod storage;

pub use config::{MemoryStorageConfig, SeedAccount, SeedFile};
pub use storage::MemoryStorage;
