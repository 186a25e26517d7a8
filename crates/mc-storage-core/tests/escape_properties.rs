//! Property-based tests for the key-file escaping codec.
//!
//! For every supported type, `unescape(escape(v), type(v)) == v`.

use mc_storage_core::escape::{escape_value, unescape_value};
use mc_storage_core::{ObjectPath, Value, ValueType};
use proptest::prelude::*;

// =============================================================================
// HELPER STRATEGIES
// =============================================================================

fn text_strategy() -> impl Strategy<Value = String> {
    // Includes every character the codec has to escape.
    prop::string::string_regex("[ a-zA-Z0-9;\\\\\n\t\r_/.@-]{0,40}").unwrap()
}

fn object_path_strategy() -> impl Strategy<Value = ObjectPath> {
    prop_oneof![
        Just(ObjectPath::new("/").unwrap()),
        prop::collection::vec("[A-Za-z0-9_]{1,8}", 1..5)
            .prop_map(|elements| ObjectPath::new(format!("/{}", elements.join("/"))).unwrap()),
    ]
}

fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        text_strategy().prop_map(Value::String),
        any::<bool>().prop_map(Value::Boolean),
        any::<i32>().prop_map(Value::Int32),
        any::<u32>().prop_map(Value::UInt32),
        any::<i64>().prop_map(Value::Int64),
        any::<u64>().prop_map(Value::UInt64),
        any::<u8>().prop_map(Value::Byte),
        prop::collection::vec(text_strategy(), 0..6).prop_map(Value::StringArray),
        object_path_strategy().prop_map(Value::ObjectPath),
        prop::collection::vec(object_path_strategy(), 0..4).prop_map(Value::ObjectPathArray),
    ]
}

proptest! {
    #[test]
    fn escape_then_unescape_is_identity(value in value_strategy()) {
        let escaped = escape_value(&value);
        let restored = unescape_value(&escaped, value.value_type()).unwrap();
        prop_assert_eq!(restored, value);
    }

    #[test]
    fn escaped_values_are_single_line(value in value_strategy()) {
        let escaped = escape_value(&value);
        prop_assert!(!escaped.contains('\n'));
        prop_assert!(!escaped.contains('\r'));
    }
}

#[test]
fn boundary_values_round_trip() {
    let boundaries = vec![
        Value::String(String::new()),
        Value::String(" ".into()),
        Value::Int32(i32::MIN),
        Value::Int32(i32::MAX),
        Value::UInt32(0),
        Value::UInt32(u32::MAX),
        Value::Int64(i64::MIN),
        Value::Int64(i64::MAX),
        Value::UInt64(u64::MAX),
        Value::Byte(0),
        Value::Byte(u8::MAX),
        Value::StringArray(vec![]),
        Value::StringArray(vec![String::new()]),
        Value::StringArray(vec![String::new(), String::new()]),
        Value::ObjectPathArray(vec![]),
    ];

    for value in boundaries {
        let escaped = escape_value(&value);
        assert_eq!(
            unescape_value(&escaped, value.value_type()).unwrap(),
            value,
            "escaped form {:?}",
            escaped
        );
    }
}

#[test]
fn every_type_has_a_signature() {
    for t in ValueType::ALL {
        assert!(!t.signature().is_empty());
    }
}
