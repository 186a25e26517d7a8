use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::ValueType;

/// Prefix distinguishing parameters from attributes in `altered-one` keys.
pub const PARAMETER_PREFIX: &str = "param-";

/// Well-known account attributes and the type each one is stored as.
///
/// These are the attributes fetched from every backend when an account is
/// first loaded or announced.
pub const KNOWN_ATTRIBUTES: &[(&str, ValueType)] = &[
    ("Manager", ValueType::String),
    ("Protocol", ValueType::String),
    ("DisplayName", ValueType::String),
    ("Icon", ValueType::String),
    ("Enabled", ValueType::Boolean),
    ("Nickname", ValueType::String),
    ("Service", ValueType::String),
    ("ConnectAutomatically", ValueType::Boolean),
    ("NormalizedName", ValueType::String),
    ("HasBeenOnline", ValueType::Boolean),
    ("Supersedes", ValueType::ObjectPathArray),
];

/// Expected type of a well-known attribute.
pub fn known_attribute_type(name: &str) -> Option<ValueType> {
    KNOWN_ATTRIBUTES
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, t)| *t)
}

/// One stored entry of an account: an attribute or a parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum EntryKey {
    Attribute(String),
    Parameter(String),
}

impl EntryKey {
    pub fn attribute(name: impl Into<String>) -> Self {
        EntryKey::Attribute(name.into())
    }

    pub fn parameter(name: impl Into<String>) -> Self {
        EntryKey::Parameter(name.into())
    }

    /// Parse the key carried by an `altered-one` signal
    /// (`DisplayName`, or `param-` plus a parameter name).
    pub fn from_signal_key(key: &str) -> Self {
        match key.strip_prefix(PARAMETER_PREFIX) {
            Some(param) => EntryKey::Parameter(param.to_string()),
            None => EntryKey::Attribute(key.to_string()),
        }
    }

    /// Bare attribute or parameter name, without prefix.
    pub fn name(&self) -> &str {
        match self {
            EntryKey::Attribute(name) | EntryKey::Parameter(name) => name,
        }
    }

    pub fn is_parameter(&self) -> bool {
        matches!(self, EntryKey::Parameter(_))
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKey::Attribute(name) => f.write_str(name),
            EntryKey::Parameter(name) => write!(f, "{}{}", PARAMETER_PREFIX, name),
        }
    }
}
