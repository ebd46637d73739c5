//! Payload shape/size limits enforced by the validator (C4).
//!
//! Grounded on the teacher's `enterprise::ratelimit` validation helpers (element
//! id and string-length sanity checks precede any rate-limit accounting there
//! too); the concrete bounds are the spec's own §4.4 table.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as Json;

use crate::error::Error;

/// `^[A-Za-z0-9_-]{1,50}$`
static ELEMENT_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,50}$").expect("static pattern is valid"));

/// Maximum length of any string value carried in an operation payload.
pub const MAX_STRING_LEN: usize = 1000;
/// Maximum length of any array value carried in an operation payload.
pub const MAX_ARRAY_LEN: usize = 100;
/// Maximum number of keys in a `data`/`style` object.
pub const MAX_PAYLOAD_KEYS: usize = 100;
/// Maximum nesting depth of a `data` payload.
pub const MAX_PAYLOAD_DEPTH: usize = 5;
/// Coordinate magnitude bound, applied to `position`, `bounds`, and `rotation`.
pub const MAX_COORDINATE: f64 = 1_000_000.0;

/// Validate an element id against the id pattern.
pub fn validate_element_id(id: &str) -> Result<(), Error> {
    if ELEMENT_ID_PATTERN.is_match(id) {
        Ok(())
    } else {
        Err(Error::ValidationFailed {
            field: "element_id".to_string(),
            code: "invalid_format".to_string(),
        })
    }
}

/// Validate a coordinate is finite and within `[-MAX_COORDINATE, MAX_COORDINATE]`.
pub fn validate_coordinate(field: &str, value: f64) -> Result<(), Error> {
    if !value.is_finite() || value.abs() > MAX_COORDINATE {
        return Err(Error::ValidationFailed {
            field: field.to_string(),
            code: "out_of_range".to_string(),
        });
    }
    Ok(())
}

/// Validate the shape of a `data`/`style` JSON payload: string length, array
/// length, key count, and nesting depth, recursively.
pub fn validate_payload_shape(field: &str, value: &Json) -> Result<(), Error> {
    validate_depth(field, value, 0)
}

fn validate_depth(field: &str, value: &Json, depth: usize) -> Result<(), Error> {
    if depth > MAX_PAYLOAD_DEPTH {
        return Err(Error::ValidationFailed {
            field: field.to_string(),
            code: "nesting_too_deep".to_string(),
        });
    }
    match value {
        Json::String(s) if s.len() > MAX_STRING_LEN => Err(Error::ValidationFailed {
            field: field.to_string(),
            code: "string_too_long".to_string(),
        }),
        Json::Array(items) => {
            if items.len() > MAX_ARRAY_LEN {
                return Err(Error::ValidationFailed {
                    field: field.to_string(),
                    code: "array_too_long".to_string(),
                });
            }
            for item in items {
                validate_depth(field, item, depth + 1)?;
            }
            Ok(())
        }
        Json::Object(map) => {
            if map.len() > MAX_PAYLOAD_KEYS {
                return Err(Error::ValidationFailed {
                    field: field.to_string(),
                    code: "too_many_keys".to_string(),
                });
            }
            for v in map.values() {
                validate_depth(field, v, depth + 1)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn element_id_accepts_valid_chars() {
        assert!(validate_element_id("el-1_2").is_ok());
        assert!(validate_element_id("").is_err());
        assert!(validate_element_id(&"x".repeat(51)).is_err());
        assert!(validate_element_id("bad id").is_err());
    }

    #[test]
    fn coordinate_rejects_nan_and_out_of_range() {
        assert!(validate_coordinate("x", 0.0).is_ok());
        assert!(validate_coordinate("x", MAX_COORDINATE).is_ok());
        assert!(validate_coordinate("x", MAX_COORDINATE + 1.0).is_err());
        assert!(validate_coordinate("x", f64::NAN).is_err());
    }

    #[test]
    fn payload_shape_rejects_deep_nesting() {
        let mut value = json!("leaf");
        for _ in 0..(MAX_PAYLOAD_DEPTH + 2) {
            value = json!([value]);
        }
        assert!(validate_payload_shape("data", &value).is_err());
    }

    #[test]
    fn payload_shape_rejects_oversized_array() {
        let value = json!(vec![1; MAX_ARRAY_LEN + 1]);
        assert!(validate_payload_shape("data", &value).is_err());
    }

    #[test]
    fn payload_shape_accepts_small_object() {
        let value = json!({"a": 1, "b": [1, 2, 3]});
        assert!(validate_payload_shape("data", &value).is_ok());
    }
}
