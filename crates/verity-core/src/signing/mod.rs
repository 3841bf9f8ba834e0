//! Content-bound signing of truth states.
//!
//! The compiler signs exactly one thing: the `state_hash` of the assembled
//! state. Key material lives behind the [`Signer`] capability so local HMAC
//! development keys and remote KMS backends are interchangeable; no secret
//! material ever appears in a state or a hash.
//!
//! # Example
//!
//! ```
//! use verity_core::signing::{HmacSigner, SignatureVerifier, Signer};
//!
//! let signer = HmacSigner::new(b"dev-key", "dev-key-1");
//! let signature = signer.sign(b"payload").unwrap();
//! assert!(signer.verify(b"payload", &signature));
//! assert!(!signer.verify(b"tampered", &signature));
//! ```

mod backend;

pub use backend::{Ed25519Signer, Ed25519Verifier, HmacSigner};

use std::fmt;

use thiserror::Error;

use crate::primitives::{SecurityBlock, TruthState};

/// Signing methods known to verifiers. A bounded enumeration: adding a
/// variant is a major-version event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningMethod {
    /// HMAC-SHA256 with a locally held key.
    LocalHmac,
    /// Ed25519 with a locally held keypair.
    Ed25519,
    /// Remote Google Cloud KMS signing.
    GcpKms,
}

impl SigningMethod {
    /// The canonical method name carried in the security block.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LocalHmac => "local_hmac",
            Self::Ed25519 => "ed25519",
            Self::GcpKms => "gcp_kms",
        }
    }
}

impl fmt::Display for SigningMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from signing backends.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SigningError {
    /// The backend cannot produce signatures right now.
    #[error("signing unavailable: {reason}")]
    Unavailable {
        /// Why signing is unavailable.
        reason: String,
    },

    /// The backend refused to sign this payload.
    #[error("signing refused: {reason}")]
    Refused {
        /// Why the backend refused.
        reason: String,
    },
}

impl SigningError {
    /// Stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "signing_unavailable",
            Self::Refused { .. } => "signing_refused",
        }
    }
}

/// Capability for producing signatures.
///
/// Key acquisition is scoped to the call; implementations release any held
/// resources on every exit path, including failure.
pub trait Signer {
    /// Signs raw bytes, returning the signature as lowercase hex.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError`] when the backend is unavailable or refuses.
    fn sign(&self, data: &[u8]) -> Result<String, SigningError>;

    /// Stable identifier of the signing key.
    fn key_id(&self) -> &str;

    /// The signing method.
    fn method(&self) -> SigningMethod;
}

/// Capability for verifying signatures: the pure inverse of [`Signer`],
/// a function of the signed bytes and a public key identifier only.
pub trait SignatureVerifier {
    /// Verifies a lowercase-hex signature over raw bytes.
    fn verify(&self, data: &[u8], signature_hex: &str) -> bool;
}

/// Signs a truth state in place, populating its security block.
///
/// Recomputes both hashes, signs the `state_hash`, and stamps `signed_at`
/// with the provided instant (the compiler passes `compile_time` unless the
/// compile inputs carry an explicit override).
///
/// # Errors
///
/// Returns [`SigningError`] when the backend fails; the state is not
/// modified in that case.
pub fn sign_truth_state(
    state: &mut TruthState,
    signer: &dyn Signer,
    signed_at: chrono::DateTime<chrono::Utc>,
) -> Result<(), SigningError> {
    let semantic_hash = state
        .compute_semantic_hash()
        .map_err(|e| SigningError::Refused {
            reason: format!("state not canonicalizable: {e}"),
        })?;
    let state_hash = state
        .compute_state_hash()
        .map_err(|e| SigningError::Refused {
            reason: format!("state not canonicalizable: {e}"),
        })?;

    let signature = signer.sign(state_hash.as_bytes())?;
    state.security = SecurityBlock {
        semantic_hash,
        state_hash,
        signature,
        signing_method: signer.method().as_str().to_string(),
        key_id: signer.key_id().to_string(),
        signed_at,
    };
    Ok(())
}

/// Verifies a signed truth state: both hashes must match the content and
/// the signature must verify against the `state_hash`.
#[must_use]
pub fn verify_truth_state(state: &TruthState, verifier: &dyn SignatureVerifier) -> bool {
    state.verify_hashes()
        && verifier.verify(
            state.security.state_hash.as_bytes(),
            &state.security.signature,
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names() {
        assert_eq!(SigningMethod::LocalHmac.as_str(), "local_hmac");
        assert_eq!(SigningMethod::Ed25519.as_str(), "ed25519");
        assert_eq!(SigningMethod::GcpKms.as_str(), "gcp_kms");
    }

    #[test]
    fn test_error_codes() {
        let unavailable = SigningError::Unavailable { reason: "kms down".into() };
        assert_eq!(unavailable.code(), "signing_unavailable");
        let refused = SigningError::Refused { reason: "policy".into() };
        assert_eq!(refused.code(), "signing_refused");
    }
}
