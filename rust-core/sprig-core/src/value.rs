//! # Database Values
//!
//! The literal type bound into statements and returned in rows.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A single row as returned by an executor, keyed by column name
pub type Row = HashMap<String, DbValue>;

/// Database value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DbValue {
    /// Null value
    Null,
    /// Integer value
    Int(i64),
    /// Float value
    Float(f64),
    /// String value
    String(String),
    /// Boolean value
    Bool(bool),
    /// Binary data
    Bytes(Vec<u8>),
}

impl DbValue {
    /// Check for SQL NULL
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integer view, also accepting integral text and booleans
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::String(s) => s.trim().parse().ok(),
            #[allow(clippy::cast_possible_truncation)]
            Self::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    /// Borrow the text of a string value
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Render as an inline SQL literal
    ///
    /// Strings are single-quoted with embedded quotes doubled. The output is
    /// meant for logs and `debug()` only and must never be executed.
    #[must_use]
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::String(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
            Self::Bytes(bytes) => {
                let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
                format!("X'{hex}'")
            }
        }
    }

    /// Convert from a JSON value
    ///
    /// Arrays and objects are stored as their JSON text.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n
                .as_i64()
                .map_or_else(|| n.as_f64().map_or(Self::Null, Self::Float), Self::Int),
            Value::String(s) => Self::String(s.clone()),
            Value::Array(_) | Value::Object(_) => Self::String(value.to_string()),
        }
    }
}

impl fmt::Display for DbValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s:?}"),
            other => f.write_str(&other.to_sql_literal()),
        }
    }
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for DbValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for DbValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for DbValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for DbValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl From<serde_json::Value> for DbValue {
    fn from(v: serde_json::Value) -> Self {
        Self::from_json(&v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_literals() {
        assert_eq!(DbValue::Null.to_sql_literal(), "NULL");
        assert_eq!(DbValue::from(42).to_sql_literal(), "42");
        assert_eq!(DbValue::from("O'Brien").to_sql_literal(), "'O''Brien'");
        assert_eq!(DbValue::from(true).to_sql_literal(), "1");
        assert_eq!(DbValue::from(vec![0xAB_u8, 0x01]).to_sql_literal(), "X'AB01'");
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(DbValue::from(None::<i64>), DbValue::Null);
        assert_eq!(DbValue::from(Some("x")), DbValue::String("x".into()));
    }

    #[test]
    fn test_as_i64_coercions() {
        assert_eq!(DbValue::from("17").as_i64(), Some(17));
        assert_eq!(DbValue::Float(3.0).as_i64(), Some(3));
        assert_eq!(DbValue::Float(3.5).as_i64(), None);
        assert_eq!(DbValue::Null.as_i64(), None);
    }

    #[test]
    fn test_from_json() {
        let value = serde_json::json!({"n": 5, "f": 1.5, "s": "a", "b": false, "z": null, "o": {"k": 1}});
        assert_eq!(DbValue::from_json(&value["n"]), DbValue::Int(5));
        assert_eq!(DbValue::from_json(&value["f"]), DbValue::Float(1.5));
        assert_eq!(DbValue::from_json(&value["s"]), DbValue::from("a"));
        assert_eq!(DbValue::from_json(&value["b"]), DbValue::Bool(false));
        assert!(DbValue::from_json(&value["z"]).is_null());
        assert_eq!(DbValue::from_json(&value["o"]), DbValue::from(r#"{"k":1}"#));
    }

    #[test]
    fn test_serialize_untagged() {
        let row: Row = [("id".to_string(), DbValue::Int(1))].into_iter().collect();
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json, serde_json::json!({"id": 1}));
    }
}
