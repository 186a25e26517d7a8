//! Flat string serialization of values, compatible with key-file syntax.
//!
//! Backends that persist to a simple `key=value` format (or that keep legacy
//! parameters whose type is unknown) store values in this escaped form.
//! Escaping the boolean `true` yields `true`; escaping a string consisting of
//! one space yields `\s`; string arrays are `;`-terminated lists.
//!
//! Every `Value` variant has an escaped form, so escaping cannot fail.
//! Unescaping needs the expected `ValueType` because the text alone is
//! ambiguous.

use crate::error::EscapeError;
use crate::value::{ObjectPath, Value, ValueType};

const LIST_SEPARATOR: char = ';';

/// Escape `value` so it can be stored as a single key-file value.
pub fn escape_value(value: &Value) -> String {
    match value {
        Value::String(s) => escape_string(s, false),
        Value::ObjectPath(p) => escape_string(p.as_str(), false),
        Value::Boolean(b) => (if *b { "true" } else { "false" }).to_string(),
        Value::Int32(v) => v.to_string(),
        Value::UInt32(v) => v.to_string(),
        Value::Int64(v) => v.to_string(),
        Value::UInt64(v) => v.to_string(),
        Value::Byte(v) => v.to_string(),
        Value::StringArray(items) => escape_list(items.iter().map(String::as_str)),
        Value::ObjectPathArray(items) => escape_list(items.iter().map(ObjectPath::as_str)),
    }
}

/// Parse `escaped` as a value of type `expected`.
pub fn unescape_value(escaped: &str, expected: ValueType) -> Result<Value, EscapeError> {
    match expected {
        ValueType::String => unescape_string(escaped).map(Value::String),
        ValueType::ObjectPath => ObjectPath::new(unescape_string(escaped)?).map(Value::ObjectPath),
        ValueType::Boolean => match escaped.trim() {
            "true" | "1" => Ok(Value::Boolean(true)),
            "false" | "0" => Ok(Value::Boolean(false)),
            _ => Err(EscapeError::Parse {
                expected,
                text: escaped.to_string(),
            }),
        },
        ValueType::Int32 => parse_integer(escaped, expected, |n| i32::try_from(n).ok().map(Value::Int32)),
        ValueType::UInt32 => parse_integer(escaped, expected, |n| u32::try_from(n).ok().map(Value::UInt32)),
        ValueType::Int64 => parse_integer(escaped, expected, |n| i64::try_from(n).ok().map(Value::Int64)),
        ValueType::UInt64 => parse_integer(escaped, expected, |n| u64::try_from(n).ok().map(Value::UInt64)),
        ValueType::Byte => parse_integer(escaped, expected, |n| u8::try_from(n).ok().map(Value::Byte)),
        ValueType::StringArray => split_list(escaped).map(Value::StringArray),
        ValueType::ObjectPathArray => split_list(escaped)?
            .into_iter()
            .map(ObjectPath::new)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::ObjectPathArray),
    }
}

fn escape_string(s: &str, in_list: bool) -> String {
    let mut out = String::with_capacity(s.len());
    let mut leading = true;

    for c in s.chars() {
        if c != ' ' {
            leading = false;
        }
        match c {
            ' ' if leading => out.push_str("\\s"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            LIST_SEPARATOR if in_list => out.push_str("\\;"),
            _ => out.push(c),
        }
    }

    out
}

fn escape_list<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for item in items {
        out.push_str(&escape_string(item, true));
        out.push(LIST_SEPARATOR);
    }
    out
}

fn unescape_char(next: Option<char>) -> Result<char, EscapeError> {
    match next {
        Some('s') => Ok(' '),
        Some('n') => Ok('\n'),
        Some('t') => Ok('\t'),
        Some('r') => Ok('\r'),
        Some('\\') => Ok('\\'),
        Some(LIST_SEPARATOR) => Ok(LIST_SEPARATOR),
        Some(other) => Err(EscapeError::BadEscape(other)),
        None => Err(EscapeError::BadEscape('\\')),
    }
}

fn unescape_string(escaped: &str) -> Result<String, EscapeError> {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            out.push(unescape_char(chars.next())?);
        } else {
            out.push(c);
        }
    }

    Ok(out)
}

fn split_list(escaped: &str) -> Result<Vec<String>, EscapeError> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut pending = false;
    let mut chars = escaped.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(unescape_char(chars.next())?);
                pending = true;
            }
            LIST_SEPARATOR => {
                items.push(std::mem::take(&mut current));
                pending = false;
            }
            _ => {
                current.push(c);
                pending = true;
            }
        }
    }

    // A final element without its terminator is accepted.
    if pending {
        items.push(current);
    }

    Ok(items)
}

fn parse_integer(
    escaped: &str,
    expected: ValueType,
    narrow: impl Fn(i128) -> Option<Value>,
) -> Result<Value, EscapeError> {
    let n: i128 = escaped.trim().parse().map_err(|_| EscapeError::Parse {
        expected,
        text: escaped.to_string(),
    })?;
    narrow(n).ok_or_else(|| EscapeError::OutOfRange {
        expected,
        text: escaped.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_escape_examples() {
        assert_eq!(escape_value(&Value::Boolean(true)), "true");
        assert_eq!(escape_value(&Value::String(" ".into())), "\\s");
        assert_eq!(escape_value(&Value::String("a b".into())), "a b");
        assert_eq!(escape_value(&Value::String("  x".into())), "\\s\\sx");
        assert_eq!(escape_value(&Value::String("a\\b\nc".into())), "a\\\\b\\nc");
        assert_eq!(escape_value(&Value::Int32(-42)), "-42");
        assert_eq!(escape_value(&Value::Byte(255)), "255");
        assert_eq!(
            escape_value(&Value::StringArray(vec!["a;b".into(), "c".into()])),
            "a\\;b;c;"
        );
        assert_eq!(escape_value(&Value::StringArray(vec![])), "");
    }

    #[test]
    fn test_semicolon_is_plain_outside_lists() {
        assert_eq!(escape_value(&Value::String("a;b".into())), "a;b");
        assert_eq!(
            unescape_value("a;b", ValueType::String).unwrap(),
            Value::String("a;b".into())
        );
    }

    #[test]
    fn test_unescape_booleans() {
        assert_eq!(unescape_value("true", ValueType::Boolean).unwrap(), Value::Boolean(true));
        assert_eq!(unescape_value("0", ValueType::Boolean).unwrap(), Value::Boolean(false));
        assert!(unescape_value("yes", ValueType::Boolean).is_err());
    }

    #[test]
    fn test_unescape_integer_range() {
        assert_eq!(
            unescape_value("4294967295", ValueType::UInt32).unwrap(),
            Value::UInt32(u32::MAX)
        );
        assert!(matches!(
            unescape_value("4294967296", ValueType::UInt32),
            Err(EscapeError::OutOfRange { .. })
        ));
        assert!(matches!(
            unescape_value("-1", ValueType::Byte),
            Err(EscapeError::OutOfRange { .. })
        ));
        assert!(matches!(
            unescape_value("ten", ValueType::Int64),
            Err(EscapeError::Parse { .. })
        ));
    }

    #[test]
    fn test_unescape_lists() {
        assert_eq!(
            unescape_value("a;b;", ValueType::StringArray).unwrap(),
            Value::StringArray(vec!["a".into(), "b".into()])
        );
        // missing final terminator
        assert_eq!(
            unescape_value("a;b", ValueType::StringArray).unwrap(),
            Value::StringArray(vec!["a".into(), "b".into()])
        );
        assert_eq!(
            unescape_value(";", ValueType::StringArray).unwrap(),
            Value::StringArray(vec![String::new()])
        );
        assert_eq!(
            unescape_value("", ValueType::StringArray).unwrap(),
            Value::StringArray(vec![])
        );
    }

    #[test]
    fn test_unescape_object_paths() {
        assert_eq!(
            unescape_value("/a;/b/c;", ValueType::ObjectPathArray).unwrap(),
            Value::ObjectPathArray(vec![
                ObjectPath::new("/a").unwrap(),
                ObjectPath::new("/b/c").unwrap()
            ])
        );
        assert!(matches!(
            unescape_value("relative", ValueType::ObjectPath),
            Err(EscapeError::ObjectPath(_))
        ));
    }

    #[test]
    fn test_bad_escapes() {
        assert_eq!(
            unescape_value("a\\q", ValueType::String),
            Err(EscapeError::BadEscape('q'))
        );
        assert_eq!(
            unescape_value("trailing\\", ValueType::String),
            Err(EscapeError::BadEscape('\\'))
        );
    }
}
