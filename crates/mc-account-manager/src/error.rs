use mc_storage_core::{StorageError, ValueType};

/// Errors returned to callers of the account manager.
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("No storage backend accepted {key} on {account}")]
    RejectedByAllBackends { account: String, key: String },

    #[error("Type mismatch: expected {expected}, stored value is {actual}")]
    TypeMismatch {
        expected: ValueType,
        actual: ValueType,
    },

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Storage restrictions do not allow setting {key} on {account}")]
    Restricted { account: String, key: String },

    #[error("No storage backend can create {manager}/{protocol} accounts")]
    NoBackendCanCreate { manager: String, protocol: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Account manager service has stopped")]
    ServiceStopped,
}

impl AccountError {
    /// Map a backend failure, keeping "not implemented" as a capability error.
    pub fn from_storage(err: StorageError) -> Self {
        match err {
            StorageError::NotImplemented(msg) => AccountError::NotSupported(msg),
            other => AccountError::Storage(other),
        }
    }
}

/// Fatal configuration errors detected while registering backends.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Storage backend {0} is already registered")]
    DuplicateBackend(String),
}

pub type Result<T> = std::result::Result<T, AccountError>;
