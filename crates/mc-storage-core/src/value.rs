use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EscapeError;

/// The set of value types an attribute or parameter may carry.
///
/// Each type is named by its D-Bus signature, which is also how it appears in
/// seed files and log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    #[serde(rename = "s")]
    String,
    #[serde(rename = "b")]
    Boolean,
    #[serde(rename = "i")]
    Int32,
    #[serde(rename = "u")]
    UInt32,
    #[serde(rename = "x")]
    Int64,
    #[serde(rename = "t")]
    UInt64,
    #[serde(rename = "y")]
    Byte,
    #[serde(rename = "as")]
    StringArray,
    #[serde(rename = "o")]
    ObjectPath,
    #[serde(rename = "ao")]
    ObjectPathArray,
}

impl ValueType {
    pub const ALL: [ValueType; 10] = [
        ValueType::String,
        ValueType::Boolean,
        ValueType::Int32,
        ValueType::UInt32,
        ValueType::Int64,
        ValueType::UInt64,
        ValueType::Byte,
        ValueType::StringArray,
        ValueType::ObjectPath,
        ValueType::ObjectPathArray,
    ];

    /// D-Bus type signature.
    pub fn signature(self) -> &'static str {
        match self {
            ValueType::String => "s",
            ValueType::Boolean => "b",
            ValueType::Int32 => "i",
            ValueType::UInt32 => "u",
            ValueType::Int64 => "x",
            ValueType::UInt64 => "t",
            ValueType::Byte => "y",
            ValueType::StringArray => "as",
            ValueType::ObjectPath => "o",
            ValueType::ObjectPathArray => "ao",
        }
    }

    fn is_integer(self) -> bool {
        matches!(
            self,
            ValueType::Int32
                | ValueType::UInt32
                | ValueType::Int64
                | ValueType::UInt64
                | ValueType::Byte
        )
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.signature())
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ValueType::ALL
            .into_iter()
            .find(|t| t.signature() == s)
            .ok_or_else(|| format!("unsupported type signature {:?}", s))
    }
}

/// A validated D-Bus object path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectPath(String);

impl ObjectPath {
    pub fn new(path: impl Into<String>) -> Result<Self, EscapeError> {
        let path = path.into();
        if Self::is_valid(&path) {
            Ok(Self(path))
        } else {
            Err(EscapeError::ObjectPath(path))
        }
    }

    /// `/` alone, or `/`-separated non-empty elements of `[A-Za-z0-9_]`.
    pub fn is_valid(path: &str) -> bool {
        if path == "/" {
            return true;
        }
        let Some(rest) = path.strip_prefix('/') else {
            return false;
        };
        rest.split('/').all(|element| {
            !element.is_empty()
                && element
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'_')
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ObjectPath {
    type Error = EscapeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ObjectPath::new(value)
    }
}

impl From<ObjectPath> for String {
    fn from(path: ObjectPath) -> Self {
        path.0
    }
}

/// A typed attribute or parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    #[serde(rename = "s")]
    String(String),
    #[serde(rename = "b")]
    Boolean(bool),
    #[serde(rename = "i")]
    Int32(i32),
    #[serde(rename = "u")]
    UInt32(u32),
    #[serde(rename = "x")]
    Int64(i64),
    #[serde(rename = "t")]
    UInt64(u64),
    #[serde(rename = "y")]
    Byte(u8),
    #[serde(rename = "as")]
    StringArray(Vec<String>),
    #[serde(rename = "o")]
    ObjectPath(ObjectPath),
    #[serde(rename = "ao")]
    ObjectPathArray(Vec<ObjectPath>),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::String(_) => ValueType::String,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Int32(_) => ValueType::Int32,
            Value::UInt32(_) => ValueType::UInt32,
            Value::Int64(_) => ValueType::Int64,
            Value::UInt64(_) => ValueType::UInt64,
            Value::Byte(_) => ValueType::Byte,
            Value::StringArray(_) => ValueType::StringArray,
            Value::ObjectPath(_) => ValueType::ObjectPath,
            Value::ObjectPathArray(_) => ValueType::ObjectPathArray,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::ObjectPath(p) => Some(p.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    fn as_integer(&self) -> Option<i128> {
        match self {
            Value::Int32(v) => Some(i128::from(*v)),
            Value::UInt32(v) => Some(i128::from(*v)),
            Value::Int64(v) => Some(i128::from(*v)),
            Value::UInt64(v) => Some(i128::from(*v)),
            Value::Byte(v) => Some(i128::from(*v)),
            _ => None,
        }
    }

    fn from_integer(n: i128, target: ValueType) -> Option<Value> {
        match target {
            ValueType::Int32 => i32::try_from(n).ok().map(Value::Int32),
            ValueType::UInt32 => u32::try_from(n).ok().map(Value::UInt32),
            ValueType::Int64 => i64::try_from(n).ok().map(Value::Int64),
            ValueType::UInt64 => u64::try_from(n).ok().map(Value::UInt64),
            ValueType::Byte => u8::try_from(n).ok().map(Value::Byte),
            _ => None,
        }
    }

    /// Convert to `target`, or `None` if no lossless conversion exists.
    ///
    /// Integers convert among themselves when the value is in range, strings
    /// and object paths convert both ways when the string is a valid path,
    /// and the same holds element-wise for their array forms.
    pub fn coerce(&self, target: ValueType) -> Option<Value> {
        if self.value_type() == target {
            return Some(self.clone());
        }

        if target.is_integer() {
            return self
                .as_integer()
                .and_then(|n| Value::from_integer(n, target));
        }

        match (self, target) {
            (Value::String(s), ValueType::ObjectPath) => {
                ObjectPath::new(s.clone()).ok().map(Value::ObjectPath)
            }
            (Value::ObjectPath(p), ValueType::String) => Some(Value::String(p.to_string())),
            (Value::StringArray(items), ValueType::ObjectPathArray) => items
                .iter()
                .map(|s| ObjectPath::new(s.clone()).ok())
                .collect::<Option<Vec<_>>>()
                .map(Value::ObjectPathArray),
            (Value::ObjectPathArray(items), ValueType::StringArray) => Some(Value::StringArray(
                items.iter().map(|p| p.to_string()).collect(),
            )),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt32(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_path_validation() {
        assert!(ObjectPath::is_valid("/"));
        assert!(ObjectPath::is_valid("/org/freedesktop/Telepathy"));
        assert!(ObjectPath::is_valid("/a_1/B2"));
        assert!(!ObjectPath::is_valid(""));
        assert!(!ObjectPath::is_valid("org"));
        assert!(!ObjectPath::is_valid("/org/"));
        assert!(!ObjectPath::is_valid("//org"));
        assert!(!ObjectPath::is_valid("/org-x"));
    }

    #[test]
    fn test_integer_coercion_respects_range() {
        assert_eq!(Value::UInt32(7).coerce(ValueType::Int64), Some(Value::Int64(7)));
        assert_eq!(Value::Int32(255).coerce(ValueType::Byte), Some(Value::Byte(255)));
        assert_eq!(Value::Int32(256).coerce(ValueType::Byte), None);
        assert_eq!(Value::Int32(-1).coerce(ValueType::UInt32), None);
        assert_eq!(
            Value::UInt64(u64::MAX).coerce(ValueType::Int64),
            None
        );
    }

    #[test]
    fn test_string_object_path_coercion() {
        let path = Value::String("/a/b".into()).coerce(ValueType::ObjectPath);
        assert_eq!(path, Some(Value::ObjectPath(ObjectPath::new("/a/b").unwrap())));
        assert_eq!(Value::String("nope".into()).coerce(ValueType::ObjectPath), None);
        assert_eq!(
            Value::ObjectPathArray(vec![ObjectPath::new("/x").unwrap()])
                .coerce(ValueType::StringArray),
            Some(Value::StringArray(vec!["/x".into()]))
        );
    }

    #[test]
    fn test_incompatible_coercion() {
        assert_eq!(Value::Boolean(true).coerce(ValueType::String), None);
        assert_eq!(Value::String("1".into()).coerce(ValueType::Int32), None);
    }

    #[test]
    fn test_value_json_shape() {
        let json = serde_json::to_string(&Value::Boolean(true)).unwrap();
        assert_eq!(json, r#"{"type":"b","value":true}"#);

        let parsed: Value = serde_json::from_str(r#"{"type":"ao","value":["/a","/b"]}"#).unwrap();
        assert_eq!(parsed.value_type(), ValueType::ObjectPathArray);

        let bad: Result<Value, _> = serde_json::from_str(r#"{"type":"o","value":"relative"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_signature_round_trip() {
        for t in ValueType::ALL {
            assert_eq!(t.signature().parse::<ValueType>().unwrap(), t);
        }
        assert!("v".parse::<ValueType>().is_err());
    }
}
