use std::collections::BTreeMap;
use std::fmt::Write;

use async_trait::async_trait;
use mc_storage_core::{AccountManager, Value};

use crate::error::Result;
use crate::ownership::OwnershipMap;

/// Escape an arbitrary string so it only contains `[A-Za-z0-9_]` and does
/// not start with a digit. Other bytes become `_xx` (lowercase hex); the
/// empty string becomes `_`.
pub fn escape_as_identifier(name: &str) -> String {
    if name.is_empty() {
        return "_".to_string();
    }

    let mut escaped = String::with_capacity(name.len());
    for (i, byte) in name.bytes().enumerate() {
        let keep = byte.is_ascii_alphabetic() || (byte.is_ascii_digit() && i > 0);
        if keep {
            escaped.push(byte as char);
        } else {
            // Writing to a String cannot fail.
            let _ = write!(escaped, "_{:02x}", byte);
        }
    }
    escaped
}

/// Build `manager/protocol/identificationN`, with the smallest `N` for which
/// `is_taken` is false.
pub fn unique_name(
    manager: &str,
    protocol: &str,
    identification: &str,
    is_taken: impl Fn(&str) -> bool,
) -> String {
    let base = format!(
        "{}/{}/{}",
        escape_as_identifier(manager),
        protocol.replace('-', "_"),
        escape_as_identifier(identification)
    );

    let mut n: u32 = 0;
    loop {
        let candidate = format!("{}{}", base, n);
        if !is_taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// The account manager as seen by a backend during one call.
pub struct ManagerContext<'a> {
    known: &'a OwnershipMap,
}

impl<'a> ManagerContext<'a> {
    pub fn new(known: &'a OwnershipMap) -> Self {
        Self { known }
    }
}

impl AccountManager for ManagerContext<'_> {
    fn unique_name(&self, manager: &str, protocol: &str, identification: &str) -> String {
        unique_name(manager, protocol, identification, |name| {
            self.known.contains_account(name)
        })
    }
}

/// Derives the normalized identification of a new account from its
/// parameters. Normally answered by the connection manager.
#[async_trait]
pub trait AccountIdentifier: Send + Sync {
    async fn identify(
        &self,
        manager: &str,
        protocol: &str,
        parameters: &BTreeMap<String, Value>,
    ) -> Result<String>;
}

/// Uses the `account` parameter verbatim, or the literal `account`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterIdentifier;

#[async_trait]
impl AccountIdentifier for ParameterIdentifier {
    async fn identify(
        &self,
        _manager: &str,
        _protocol: &str,
        parameters: &BTreeMap<String, Value>,
    ) -> Result<String> {
        Ok(parameters
            .get("account")
            .and_then(Value::as_str)
            .unwrap_or("account")
            .to_string())
    }
}
