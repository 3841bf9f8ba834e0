//! Signing backends: local HMAC and Ed25519.

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use super::{SignatureVerifier, Signer, SigningError, SigningMethod};

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 signer with a locally held key.
///
/// The key is held in a zeroizing container and never leaves the signer.
pub struct HmacSigner {
    key: Zeroizing<Vec<u8>>,
    key_id: String,
}

impl HmacSigner {
    /// Creates a signer from raw key bytes.
    #[must_use]
    pub fn new(key: &[u8], key_id: impl Into<String>) -> Self {
        Self {
            key: Zeroizing::new(key.to_vec()),
            key_id: key_id.into(),
        }
    }

    fn mac(&self, data: &[u8]) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }
}

impl Signer for HmacSigner {
    fn sign(&self, data: &[u8]) -> Result<String, SigningError> {
        Ok(hex::encode(self.mac(data)))
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn method(&self) -> SigningMethod {
        SigningMethod::LocalHmac
    }
}

impl SignatureVerifier for HmacSigner {
    fn verify(&self, data: &[u8], signature_hex: &str) -> bool {
        let Ok(provided) = hex::decode(signature_hex) else {
            return false;
        };
        let expected = self.mac(data);
        expected.ct_eq(&provided).into()
    }
}

/// Ed25519 signer with a locally held keypair.
pub struct Ed25519Signer {
    signing_key: SigningKey,
    key_id: String,
}

impl Ed25519Signer {
    /// Creates a signer from an existing signing key.
    #[must_use]
    pub fn new(signing_key: SigningKey, key_id: impl Into<String>) -> Self {
        Self {
            signing_key,
            key_id: key_id.into(),
        }
    }

    /// Generates a fresh keypair.
    #[must_use]
    pub fn generate(key_id: impl Into<String>) -> Self {
        let mut rng = rand::rngs::OsRng;
        Self::new(SigningKey::generate(&mut rng), key_id)
    }

    /// The verifying key for this signer's keypair.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}

impl Signer for Ed25519Signer {
    fn sign(&self, data: &[u8]) -> Result<String, SigningError> {
        Ok(hex::encode(self.signing_key.sign(data).to_bytes()))
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn method(&self) -> SigningMethod {
        SigningMethod::Ed25519
    }
}

/// Verifier holding only an Ed25519 public key.
pub struct Ed25519Verifier {
    verifying_key: VerifyingKey,
}

impl Ed25519Verifier {
    /// Creates a verifier from a verifying key.
    #[must_use]
    pub const fn new(verifying_key: VerifyingKey) -> Self {
        Self { verifying_key }
    }

    /// Creates a verifier from 32 raw public key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::Refused`] for malformed key bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, SigningError> {
        VerifyingKey::from_bytes(bytes)
            .map(Self::new)
            .map_err(|e| SigningError::Refused {
                reason: format!("invalid verifying key: {e}"),
            })
    }
}

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, data: &[u8], signature_hex: &str) -> bool {
        let Ok(bytes) = hex::decode(signature_hex) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(&bytes) else {
            return false;
        };
        self.verifying_key.verify(data, &signature).is_ok()
    }
}
