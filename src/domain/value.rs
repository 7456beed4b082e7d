//! Dynamic scope values and database column coercion.
//!
//! Scope values form a closed variant: the expression evaluator, the
//! path writer, and the JSON renderer are the only consumers, and all
//! three match exhaustively.

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// A value held in the request scope.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Boolean coercion: `true` is true, `false` and null are false,
    /// every other value is true.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Null => false,
            _ => true,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

/// Coerce a nullable column value into its textual form.
///
/// Null columns become the empty string; everything else takes its
/// default textual formatting.
pub fn db_text<T: fmt::Display>(value: Option<T>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => String::new(),
    }
}

/// Coerce a nullable byte-buffer column into a string.
pub fn db_bytes(value: Option<Vec<u8>>) -> String {
    match value {
        Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_bytes_round_trips_utf8() {
        let input = "héllo wörld";
        assert_eq!(db_bytes(Some(input.as_bytes().to_vec())), input);
    }

    #[test]
    fn null_columns_coerce_to_empty_string() {
        assert_eq!(db_bytes(None), "");
        assert_eq!(db_text::<i64>(None), "");
    }

    #[test]
    fn db_text_uses_default_formatting() {
        assert_eq!(db_text(Some(42_i64)), "42");
        assert_eq!(db_text(Some(true)), "true");
        assert_eq!(db_text(Some(1.5_f64)), "1.5");
    }

    #[test]
    fn truthiness_follows_coercion_rules() {
        assert!(Value::Bool(true).truthy());
        assert!(!Value::Bool(false).truthy());
        assert!(!Value::Null.truthy());
        assert!(Value::Int(0).truthy());
        assert!(Value::String(String::new()).truthy());
    }

    #[test]
    fn json_numbers_split_into_int_and_float() {
        let value = Value::from(serde_json::json!({"a": 1, "b": 1.5, "c": [true, null]}));
        let Value::Map(entries) = value else {
            panic!("expected map");
        };
        assert_eq!(entries["a"], Value::Int(1));
        assert_eq!(entries["b"], Value::Float(1.5));
        assert_eq!(
            entries["c"],
            Value::List(vec![Value::Bool(true), Value::Null])
        );
    }

    #[test]
    fn serializes_as_plain_json() {
        let mut map = BTreeMap::new();
        map.insert("n".to_string(), Value::String("1".to_string()));
        let value = Value::List(vec![Value::Map(map)]);
        assert_eq!(
            serde_json::to_string(&value).expect("serialize"),
            r#"[{"n":"1"}]"#
        );
    }
}
