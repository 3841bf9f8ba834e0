//! Evidence references with content-bound identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::canonical::{CanonicalError, canonical_hash, sha256_hex};
use crate::temporal::canonical_datetime;

/// A reference to an evidence blob.
///
/// Identity is the SHA-256 of the content; the URI is a non-canonical
/// locator pointing at where the content can be fetched. The core never
/// holds evidence bytes, only hashes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRef {
    /// Non-canonical locator (object store, HTTP, `file://`).
    pub uri: String,

    /// Content identity: 64 lowercase hex characters of SHA-256.
    pub sha256: String,

    /// MIME type of the content, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// Content length in bytes, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byte_size: Option<u64>,

    /// When the evidence was captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_time: Option<DateTime<Utc>>,
}

impl EvidenceRef {
    /// Creates an evidence reference from content bytes, computing the
    /// SHA-256 identity.
    #[must_use]
    pub fn from_content(content: &[u8], uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            sha256: sha256_hex(content),
            mime_type: None,
            byte_size: Some(content.len() as u64),
            capture_time: None,
        }
    }

    /// Sets the MIME type (builder pattern).
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Sets the capture time (builder pattern).
    #[must_use]
    pub const fn with_capture_time(mut self, capture_time: DateTime<Utc>) -> Self {
        self.capture_time = Some(capture_time);
        self
    }

    /// Whether the stored hash is well-formed: 64 lowercase hex characters.
    #[must_use]
    pub fn has_valid_hash(&self) -> bool {
        self.sha256.len() == 64
            && self
                .sha256
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    /// The canonical projection: only identity-defining fields, with the
    /// hash lowercased.
    #[must_use]
    pub fn canonical(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("sha256".into(), json!(self.sha256.to_lowercase()));
        obj.insert("uri".into(), json!(self.uri));
        if let Some(mime) = &self.mime_type {
            obj.insert("mime_type".into(), json!(mime.to_lowercase()));
        }
        if let Some(t) = self.capture_time {
            obj.insert("capture_time".into(), json!(canonical_datetime(t)));
        }
        Value::Object(obj)
    }

    /// Computes the canonical hash of this reference.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError`] if canonicalization fails.
    pub fn hash(&self) -> Result<String, CanonicalError> {
        canonical_hash(&self.canonical())
    }
}
