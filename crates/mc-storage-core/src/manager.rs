use crate::error::EscapeError;
use crate::escape;
use crate::value::{Value, ValueType};

/// Callbacks the account manager offers to storage backends.
///
/// Most `AccountStorage` methods receive a `&dyn AccountManager`. Only the
/// account manager implements this trait.
pub trait AccountManager: Send + Sync {
    /// Generate the canonical unique name for a new account.
    ///
    /// `identification` is the normalized account identification (the result
    /// of identifying the account's parameters). Must not be called for
    /// accounts that already have a name.
    fn unique_name(&self, manager: &str, protocol: &str, identification: &str) -> String;

    /// Escape `value` for storage in a key-file-like format.
    fn escape_value(&self, value: &Value) -> String {
        escape::escape_value(value)
    }

    /// Unescape a key-file value, interpreting it as `expected`.
    fn unescape_value(&self, escaped: &str, expected: ValueType) -> Result<Value, EscapeError> {
        escape::unescape_value(escaped, expected)
    }
}
