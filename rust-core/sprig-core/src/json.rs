//! # JSON Serialization Module
//!
//! Request bodies are parsed with simd-json; responses are written with
//! serde_json.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Parse a JSON string into a typed value using simd-json
///
/// # Errors
///
/// Returns a 400 `Error::HttpStatus` if the text is not valid JSON for `T`.
pub fn parse_json<T: DeserializeOwned>(json_str: &str) -> Result<T> {
    let mut bytes = json_str.as_bytes().to_vec();
    parse_json_bytes(&mut bytes)
}

/// Parse JSON bytes in place using simd-json
///
/// simd-json rewrites the buffer while parsing, hence `&mut`.
///
/// # Errors
///
/// Returns a 400 `Error::HttpStatus` if the bytes are not valid JSON for `T`.
pub fn parse_json_bytes<T: DeserializeOwned>(bytes: &mut [u8]) -> Result<T> {
    simd_json::from_slice(bytes).map_err(|e| Error::bad_request(format!("Invalid JSON: {e}")))
}

/// Serialize a value to a JSON string
///
/// # Errors
///
/// Returns `Error::Json` if the value cannot be serialized.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct NewUser {
        name: String,
        age: i32,
    }

    #[test]
    fn test_parse_json_object() {
        let user: NewUser = parse_json(r#"{"name": "Ada", "age": 36}"#).unwrap();
        assert_eq!(user.name, "Ada");
        assert_eq!(user.age, 36);
    }

    #[test]
    fn test_parse_json_map() {
        let map: HashMap<String, String> = parse_json(r#"{"key": "value"}"#).unwrap();
        assert_eq!(map.get("key"), Some(&"value".to_string()));
    }

    #[test]
    fn test_parse_json_bytes() {
        let mut bytes = br#"{"name": "Jane", "age": 25}"#.to_vec();
        let user: NewUser = parse_json_bytes(&mut bytes).unwrap();
        assert_eq!(user.name, "Jane");
    }

    #[test]
    fn test_to_json() {
        let user = NewUser {
            name: "Bob".to_string(),
            age: 40,
        };
        assert_eq!(to_json(&user).unwrap(), r#"{"name":"Bob","age":40}"#);
    }

    #[test]
    fn test_invalid_json_is_bad_request() {
        let err = parse_json::<NewUser>("not valid json").unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
