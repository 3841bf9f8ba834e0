//! SHA-256 hashing over canonical representations.
//!
//! All protocol hashing goes through this module: the hash of a value is the
//! SHA-256 of its canonical bytes, rendered as 64 lowercase hex characters.

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::json::{CanonicalError, canonicalize};

/// Computes the SHA-256 of raw bytes as a lowercase hex string.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Computes the canonical hash of a value.
///
/// This is the primary hashing API for all protocol primitives.
///
/// # Errors
///
/// Returns [`CanonicalError`] when the value cannot be canonicalized.
pub fn canonical_hash(value: &Value) -> Result<String, CanonicalError> {
    Ok(sha256_hex(&canonicalize(value)?))
}

/// Combines multiple hex hashes into one by hashing their `|`-joined
/// concatenation.
#[must_use]
pub fn hash_combine(hashes: &[&str]) -> String {
    sha256_hex(hashes.join("|").as_bytes())
}

/// Verifies that a value's canonical hash matches an expected hex string.
///
/// Comparison is against the lowercase form of `expected`.
///
/// # Errors
///
/// Returns [`CanonicalError`] when the value cannot be canonicalized.
pub fn verify_hash(value: &Value, expected: &str) -> Result<bool, CanonicalError> {
    Ok(canonical_hash(value)? == expected.to_lowercase())
}
