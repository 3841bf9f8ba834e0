//! Canonical serialization for deterministic hashing and signing.
//!
//! Every protocol hash in this crate goes through this module. The canonical
//! form of a value is a single byte string with the following properties:
//!
//! - **Sorted keys**: object keys are emitted in byte-order after NFC
//!   normalization.
//! - **NFC strings**: all strings (keys and values) are Unicode NFC
//!   normalized on emission.
//! - **Quantized floats**: non-integer numbers are quantized to six decimal
//!   places, formatted without scientific notation, trailing zeros, or
//!   negative zero.
//! - **Minimal separators**: `,` and `:` only, no whitespace.
//! - **Minimal escaping**: only `"`, `\`, and control characters U+0000
//!   through U+001F are escaped.
//!
//! Datetimes never appear as native values here; callers convert them to
//! canonical UTC strings via [`crate::temporal`] before building a value.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use verity_core::canonical::{canonical_hash, canonical_string};
//!
//! let value = json!({"z": 1, "a": 0.25});
//! assert_eq!(canonical_string(&value).unwrap(), r#"{"a":0.25,"z":1}"#);
//! assert_eq!(canonical_hash(&value).unwrap().len(), 64);
//! ```

mod float;
mod hash;
mod json;
mod string;

pub use float::{canonical_float, quantize};
pub use hash::{canonical_hash, hash_combine, sha256_hex, verify_hash};
pub use json::{CanonicalError, MAX_DEPTH, canonical_string, canonicalize, is_canonical};
pub use string::{canonical_string_value, is_canonical_id, normalize_nfc, to_canonical_id};
