//! Canonical JSON emission.
//!
//! Walks a `serde_json::Value` and produces the canonical byte form defined
//! by the protocol: sorted NFC keys, quantized floats, minimal separators
//! and escaping. The emitter is the single source of bytes for every hash
//! and signature in the crate.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde_json::{Map, Value};
use thiserror::Error;

use super::float::canonical_float;
use super::string::normalize_nfc;

/// Maximum recursion depth for canonicalization to prevent stack overflow.
pub const MAX_DEPTH: usize = 128;

/// Errors that can occur during canonicalization.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CanonicalError {
    /// A NaN or infinite number was encountered.
    ///
    /// Non-finite numbers have no canonical decimal representation.
    #[error("non-finite number: NaN and infinities are not representable")]
    NonFiniteNumber,

    /// Two object keys became identical after NFC normalization.
    #[error("duplicate key after normalization: '{key}'")]
    DuplicateKey {
        /// The normalized key that collided.
        key: String,
    },

    /// The maximum nesting depth was exceeded.
    #[error("max depth exceeded: value nested deeper than {max_depth} levels")]
    MaxDepthExceeded {
        /// The depth limit that was exceeded.
        max_depth: usize,
    },

    /// An identifier reduced to the empty string.
    #[error("canonical identifier cannot be empty")]
    EmptyIdentifier,
}

/// Produces the canonical byte string for a value.
///
/// This is the primary canonicalization entry point; hashing and signing
/// operate on its output.
///
/// # Errors
///
/// Returns [`CanonicalError`] for non-finite numbers, post-normalization
/// duplicate keys, or nesting beyond [`MAX_DEPTH`].
pub fn canonicalize(value: &Value) -> Result<Vec<u8>, CanonicalError> {
    canonical_string(value).map(String::into_bytes)
}

/// Produces the canonical text form of a value.
///
/// # Errors
///
/// Same failure modes as [`canonicalize`].
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use verity_core::canonical::canonical_string;
///
/// let s = canonical_string(&json!({"b": 2, "a": true, "w": 1.50})).unwrap();
/// assert_eq!(s, r#"{"a":true,"b":2,"w":1.5}"#);
/// ```
pub fn canonical_string(value: &Value) -> Result<String, CanonicalError> {
    let mut out = String::new();
    emit_value(value, &mut out, 0)?;
    Ok(out)
}

/// Checks whether the input is already in canonical form.
#[must_use]
pub fn is_canonical(input: &str) -> bool {
    serde_json::from_str::<Value>(input)
        .ok()
        .and_then(|v| canonical_string(&v).ok())
        .is_some_and(|canonical| canonical == input)
}

fn emit_value(value: &Value, out: &mut String, depth: usize) -> Result<(), CanonicalError> {
    if depth > MAX_DEPTH {
        return Err(CanonicalError::MaxDepthExceeded {
            max_depth: MAX_DEPTH,
        });
    }
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            // Integers pass through untouched; everything else is quantized.
            if let Some(i) = n.as_i64() {
                let _ = write!(out, "{i}");
            } else if let Some(u) = n.as_u64() {
                let _ = write!(out, "{u}");
            } else {
                let f = n.as_f64().ok_or(CanonicalError::NonFiniteNumber)?;
                out.push_str(&canonical_float(f)?);
            }
        },
        Value::String(s) => emit_string(s, out),
        Value::Array(arr) => {
            out.push('[');
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                emit_value(item, out, depth + 1)?;
            }
            out.push(']');
        },
        Value::Object(obj) => emit_object(obj, out, depth)?,
    }
    Ok(())
}

fn emit_object(
    obj: &Map<String, Value>,
    out: &mut String,
    depth: usize,
) -> Result<(), CanonicalError> {
    // Normalize keys first so the sort order is over canonical bytes.
    let mut entries: Vec<(String, &Value)> = obj
        .iter()
        .map(|(k, v)| (normalize_nfc(k), v))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut seen = BTreeSet::new();
    out.push('{');
    for (i, (key, val)) in entries.iter().enumerate() {
        if !seen.insert(key.clone()) {
            return Err(CanonicalError::DuplicateKey { key: key.clone() });
        }
        if i > 0 {
            out.push(',');
        }
        emit_string(key, out);
        out.push(':');
        emit_value(val, out, depth + 1)?;
    }
    out.push('}');
    Ok(())
}

/// Emits a string with NFC normalization and minimal escaping.
///
/// Only `"`, `\`, and control characters U+0000 through U+001F are escaped;
/// control characters use the short escapes where defined and `\uXXXX`
/// otherwise.
fn emit_string(s: &str, out: &mut String) {
    let normalized = normalize_nfc(s);
    out.push('"');
    for c in normalized.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if ('\u{0000}'..='\u{001F}').contains(&c) => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            },
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    // =========================================================================
    // Basic Canonicalization Tests
    // =========================================================================

    #[test]
    fn test_sorts_keys() {
        let value = json!({"z": 1, "a": 2, "m": 3});
        assert_eq!(
            canonical_string(&value).unwrap(),
            r#"{"a":2,"m":3,"z":1}"#
        );
    }

    #[test]
    fn test_nested_objects_sorted() {
        let value = json!({"outer": {"z": 1, "a": 2}});
        assert_eq!(
            canonical_string(&value).unwrap(),
            r#"{"outer":{"a":2,"z":1}}"#
        );
    }

    #[test]
    fn test_arrays_preserve_order() {
        let value = json!([3, 1, 2]);
        assert_eq!(canonical_string(&value).unwrap(), "[3,1,2]");
    }

    #[test]
    fn test_primitives() {
        assert_eq!(canonical_string(&json!(null)).unwrap(), "null");
        assert_eq!(canonical_string(&json!(true)).unwrap(), "true");
        assert_eq!(canonical_string(&json!(42)).unwrap(), "42");
        assert_eq!(canonical_string(&json!(-7)).unwrap(), "-7");
        assert_eq!(canonical_string(&json!("hi")).unwrap(), r#""hi""#);
    }

    #[test]
    fn test_float_quantization_in_emission() {
        assert_eq!(canonical_string(&json!(1.250_000_1)).unwrap(), "1.25");
        assert_eq!(canonical_string(&json!(0.5)).unwrap(), "0.5");
    }

    // =========================================================================
    // Idempotence
    // =========================================================================

    #[test]
    fn test_idempotent() {
        let inputs = [
            json!({"z": 1, "a": 2}),
            json!({"nested": {"b": 2, "a": 1}, "top": "value"}),
            json!([1, 2, {"y": 3, "x": 4}]),
        ];
        for input in &inputs {
            let once = canonical_string(input).unwrap();
            let reparsed: Value = serde_json::from_str(&once).unwrap();
            let twice = canonical_string(&reparsed).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_is_canonical() {
        assert!(is_canonical(r#"{"a":1,"b":2}"#));
        assert!(!is_canonical(r#"{"b":2,"a":1}"#));
        assert!(!is_canonical(r#"{ "a": 1 }"#));
    }

    // =========================================================================
    // String Handling
    // =========================================================================

    #[test]
    fn test_escape_special_chars() {
        let value = json!({"text": "line1\nline2\ttab"});
        assert_eq!(
            canonical_string(&value).unwrap(),
            r#"{"text":"line1\nline2\ttab"}"#
        );
    }

    #[test]
    fn test_escape_quotes_and_backslash() {
        let value = json!({"text": "say \"hello\" and use \\"});
        assert_eq!(
            canonical_string(&value).unwrap(),
            r#"{"text":"say \"hello\" and use \\"}"#
        );
    }

    #[test]
    fn test_escape_control_chars() {
        let value = json!({"text": "\u{0000}"});
        assert!(canonical_string(&value).unwrap().contains("\\u0000"));
    }

    #[test]
    fn test_del_not_escaped() {
        // U+007F and C1 controls are emitted raw per minimal escaping.
        let value = json!({"text": "\u{007F}"});
        let out = canonical_string(&value).unwrap();
        assert!(!out.contains("\\u007f"));
        assert!(out.contains('\u{007F}'));
    }

    #[test]
    fn test_nfc_applied_to_values_and_keys() {
        // Decomposed e + combining acute normalizes on emission.
        let value = json!({"e\u{0301}": "e\u{0301}"});
        let out = canonical_string(&value).unwrap();
        assert_eq!(out, "{\"\u{00e9}\":\"\u{00e9}\"}");
    }

    #[test]
    fn test_duplicate_keys_after_nfc_rejected() {
        let mut obj = Map::new();
        obj.insert("\u{00e9}".to_string(), json!(1));
        obj.insert("e\u{0301}".to_string(), json!(2));
        let result = canonical_string(&Value::Object(obj));
        assert!(matches!(result, Err(CanonicalError::DuplicateKey { .. })));
    }

    // =========================================================================
    // Depth Limit
    // =========================================================================

    #[test]
    fn test_depth_limit() {
        let mut value = json!(0);
        for _ in 0..150 {
            value = json!({ "n": value });
        }
        let result = canonical_string(&value);
        assert!(matches!(
            result,
            Err(CanonicalError::MaxDepthExceeded { max_depth: MAX_DEPTH })
        ));
    }

    // =========================================================================
    // Determinism
    // =========================================================================

    #[test]
    fn test_determinism_across_key_orders() {
        let a = json!({"c": 3, "a": 1, "b": 2});
        let b = json!({"b": 2, "c": 3, "a": 1});
        assert_eq!(
            canonical_string(&a).unwrap(),
            canonical_string(&b).unwrap()
        );
    }

    #[test]
    fn test_empty_containers() {
        assert_eq!(canonical_string(&json!({})).unwrap(), "{}");
        assert_eq!(canonical_string(&json!([])).unwrap(), "[]");
        assert_eq!(canonical_string(&json!("")).unwrap(), r#""""#);
    }
}
