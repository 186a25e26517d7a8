use thiserror::Error;

use crate::value::ValueType;

/// Errors reported by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The backend lacks the capability (read-only storage, no create, ...).
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// The backend understood the request but declined it.
    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl StorageError {
    /// Whether this error means "capability missing" rather than a real failure.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, StorageError::NotImplemented(_))
    }
}

/// Errors raised while unescaping a key-file value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EscapeError {
    #[error("Invalid {expected} value {text:?}")]
    Parse { expected: ValueType, text: String },

    #[error("Value {text:?} out of range for {expected}")]
    OutOfRange { expected: ValueType, text: String },

    #[error("Invalid escape sequence \\{0} in key-file value")]
    BadEscape(char),

    #[error("Invalid object path {0:?}")]
    ObjectPath(String),
}

impl From<EscapeError> for StorageError {
    fn from(err: EscapeError) -> Self {
        StorageError::InvalidValue(err.to_string())
    }
}
