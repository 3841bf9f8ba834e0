//! Truth states: signed, deterministic verdicts.
//!
//! A truth state carries two digests with different stability:
//!
//! - `semantic_hash` covers the truth content only — it is stable across
//!   `compile_time` and `compiler_version` differences;
//! - `state_hash` covers the full envelope including both.
//!
//! The signature binds `state_hash`. Any single-byte change to a canonical
//! field invalidates both the hash and the signature.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::canonical::{CanonicalError, canonical_hash, quantize};
use crate::temporal::canonical_datetime;

/// Truth state status values.
///
/// Intermediate statuses may change while an observation window is open;
/// final statuses are set only at window end and must be signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TruthStatus {
    /// Initial state before any evaluation.
    Pending,
    /// Evidence currently leans true.
    LeaningTrue,
    /// Evidence currently leans false.
    LeaningFalse,
    /// Contradictory evidence; no lean.
    Undecided,
    /// Critical lane awaiting human quorum.
    PendingHumanReview,
    /// Verified true (final).
    VerifiedTrue,
    /// Verified false (final).
    VerifiedFalse,
    /// Window closed without a verdict (final).
    Inconclusive,
    /// Validity window elapsed (final).
    Expired,
}

impl TruthStatus {
    /// Whether this status is terminal and must be signed.
    #[must_use]
    pub const fn is_final(self) -> bool {
        matches!(
            self,
            Self::VerifiedTrue | Self::VerifiedFalse | Self::Inconclusive | Self::Expired
        )
    }

    /// The canonical SCREAMING_SNAKE_CASE name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::LeaningTrue => "LEANING_TRUE",
            Self::LeaningFalse => "LEANING_FALSE",
            Self::Undecided => "UNDECIDED",
            Self::PendingHumanReview => "PENDING_HUMAN_REVIEW",
            Self::VerifiedTrue => "VERIFIED_TRUE",
            Self::VerifiedFalse => "VERIFIED_FALSE",
            Self::Inconclusive => "INCONCLUSIVE",
            Self::Expired => "EXPIRED",
        }
    }
}

/// What caused a verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationBasis {
    /// AI confidence cleared the monitor-lane threshold.
    AiAutovalidation,
    /// Weighted human consensus cleared the threshold.
    HumanConsensus,
    /// An authorized role overrode the vote.
    AuthorityOverride,
    /// Uncontested observation finalized at window close.
    ImplicitConsensus,
    /// Window closed with a contract-defined default.
    TimeoutDefault,
    /// Window closed without reaching any threshold.
    TimeoutInconclusive,
}

impl VerificationBasis {
    /// The canonical SCREAMING_SNAKE_CASE name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AiAutovalidation => "AI_AUTOVALIDATION",
            Self::HumanConsensus => "HUMAN_CONSENSUS",
            Self::AuthorityOverride => "AUTHORITY_OVERRIDE",
            Self::ImplicitConsensus => "IMPLICIT_CONSENSUS",
            Self::TimeoutDefault => "TIMEOUT_DEFAULT",
            Self::TimeoutInconclusive => "TIMEOUT_INCONCLUSIVE",
        }
    }
}

/// Explicit record of all inputs to a compilation.
///
/// A truth state stores enough information to replay its own compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileInputs {
    /// Sorted observation ids.
    pub observation_ids: Vec<String>,
    /// Contract id.
    pub claim_type_id: String,
    /// Contract hash pinning the exact contract body.
    pub claim_type_hash: String,
    /// Trust policy version in force.
    pub policy_version: String,
    /// Compiler version.
    pub compiler_version: String,
    /// Hash of the trust snapshot consumed.
    pub trust_snapshot_hash: String,
    /// Explicit compile time (never wall-clock).
    pub compile_time: DateTime<Utc>,
}

/// Cryptographic security block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityBlock {
    /// Content-only digest, stable across `compile_time` and
    /// `compiler_version`.
    pub semantic_hash: String,
    /// Full-envelope digest.
    pub state_hash: String,
    /// Signature over `state_hash`, lowercase hex.
    pub signature: String,
    /// Signing method: `local_hmac`, `ed25519`, `gcp_kms`, ...
    pub signing_method: String,
    /// Stable key identifier.
    pub key_id: String,
    /// When the state was signed; equals `compile_time` unless the compile
    /// inputs recorded an explicit override.
    pub signed_at: DateTime<Utc>,
}

/// Breakdown of the composite confidence computation, kept for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConfidenceBreakdown {
    /// Weighted component contributions.
    pub components: BTreeMap<String, f64>,
    /// Applied modifier values.
    pub modifiers: BTreeMap<String, f64>,
    /// Sum before clamping.
    pub raw_score: f64,
    /// Clamped, quantized final score.
    pub final_score: f64,
}

/// Record of the consensus computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConsensusRecord {
    /// Weighted score.
    pub score: f64,
    /// Admitted RATIFY votes.
    pub ratify_count: u32,
    /// Admitted REJECT votes.
    pub reject_count: u32,
    /// Admitted ABSTAIN votes.
    pub abstain_count: u32,
    /// Voters excluded by the admissibility filter (recorded, not scored).
    pub excluded_voters: Vec<String>,
    /// Whether a threshold finalized the vote.
    pub finalized: bool,
    /// Why the vote finalized, when it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalize_reason: Option<String>,
    /// `((ratify − reject) / total + 1) / 2`; 0.5 with no votes.
    pub positive_ratio: f64,
}

/// A signed, deterministic verdict about a truth key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruthState {
    /// Canonical truth key string.
    pub truth_key: String,
    /// Contract id.
    pub claim_type: String,
    /// Contract hash.
    pub claim_type_hash: String,
    /// Current status.
    pub status: TruthStatus,
    /// What caused the verification, for verified states.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_basis: Option<VerificationBasis>,
    /// Derived, schema-validated claim payload.
    pub claim: BTreeMap<String, Value>,
    /// Mean AI confidence over the observations.
    pub ai_confidence: f64,
    /// Composite confidence in `[0, 1]`.
    pub confidence: f64,
    /// Audit breakdown of the confidence computation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_breakdown: Option<ConfidenceBreakdown>,
    /// Sorted transparency flags.
    pub transparency_flags: Vec<String>,
    /// Everything needed to replay this compilation.
    pub compile_inputs: CompileInputs,
    /// Sorted evidence identities (SHA-256 hex).
    pub evidence_refs: Vec<String>,
    /// Sorted observation ids.
    pub observation_ids: Vec<String>,
    /// Consensus record, when votes were present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus: Option<ConsensusRecord>,
    /// Security block.
    pub security: SecurityBlock,
}

impl TruthState {
    /// The semantic content: stable across `compile_time` and
    /// `compiler_version`.
    #[must_use]
    pub fn semantic_content(&self) -> Value {
        let mut flags = self.transparency_flags.clone();
        flags.sort();
        let mut evidence = self.evidence_refs.clone();
        evidence.sort();
        let mut observations = self.observation_ids.clone();
        observations.sort();

        let claim: Map<String, Value> = self
            .claim
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        json!({
            "truth_key": self.truth_key,
            "claim_type": self.claim_type.to_lowercase(),
            "claim_type_hash": self.claim_type_hash.to_lowercase(),
            "claim": Value::Object(claim),
            "status": self.status.as_str(),
            "verification_basis": self.verification_basis.map(VerificationBasis::as_str),
            "ai_confidence": quantize(self.ai_confidence).unwrap_or(0.0),
            "confidence": quantize(self.confidence).unwrap_or(0.0),
            "transparency_flags": flags,
            "evidence_refs": evidence,
            "observation_ids": observations,
            "trust_snapshot_hash": self.compile_inputs.trust_snapshot_hash.to_lowercase(),
            "policy_version": self.compile_inputs.policy_version,
        })
    }

    /// The full envelope: semantic content plus `compile_time` and
    /// `compiler_version`.
    #[must_use]
    pub fn full_envelope(&self) -> Value {
        let mut envelope = self.semantic_content();
        if let Value::Object(obj) = &mut envelope {
            obj.insert(
                "compile_time".into(),
                json!(canonical_datetime(self.compile_inputs.compile_time)),
            );
            obj.insert(
                "compiler_version".into(),
                json!(self.compile_inputs.compiler_version),
            );
        }
        envelope
    }

    /// Computes the semantic hash.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError`] if the claim payload cannot be
    /// canonicalized.
    pub fn compute_semantic_hash(&self) -> Result<String, CanonicalError> {
        canonical_hash(&self.semantic_content())
    }

    /// Computes the full state hash.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError`] if the claim payload cannot be
    /// canonicalized.
    pub fn compute_state_hash(&self) -> Result<String, CanonicalError> {
        canonical_hash(&self.full_envelope())
    }

    /// Verifies that the stored hashes match the computed hashes.
    #[must_use]
    pub fn verify_hashes(&self) -> bool {
        let semantic = self.compute_semantic_hash();
        let state = self.compute_state_hash();
        matches!((semantic, state), (Ok(s), Ok(f))
            if s == self.security.semantic_hash && f == self.security.state_hash)
    }
}

#[cfg(test)]
mod tests {
    use crate::temporal::parse_datetime;

    use super::*;

    fn state() -> TruthState {
        let compile_time = parse_datetime("2026-01-07T12:00:00Z").unwrap();
        let mut state = TruthState {
            truth_key: "earth:flood:h3:88283082b9fffff:surface:2026-01-07T11:00Z".into(),
            claim_type: "earth.flood.v1".into(),
            claim_type_hash: "c".repeat(64),
            status: TruthStatus::VerifiedTrue,
            verification_basis: Some(VerificationBasis::AiAutovalidation),
            claim: BTreeMap::from([
                ("water_level_meters".to_string(), json!(1.25)),
                ("observation_count".to_string(), json!(2)),
            ]),
            ai_confidence: 0.91,
            confidence: 0.88,
            confidence_breakdown: None,
            transparency_flags: vec![],
            compile_inputs: CompileInputs {
                observation_ids: vec!["obs-001".into(), "obs-002".into()],
                claim_type_id: "earth.flood.v1".into(),
                claim_type_hash: "c".repeat(64),
                policy_version: "policy:verity_v1.0.0".into(),
                compiler_version: "1.0.0".into(),
                trust_snapshot_hash: "d".repeat(64),
                compile_time,
            },
            evidence_refs: vec!["a".repeat(64), "b".repeat(64)],
            observation_ids: vec!["obs-001".into(), "obs-002".into()],
            consensus: None,
            security: SecurityBlock {
                semantic_hash: String::new(),
                state_hash: String::new(),
                signature: String::new(),
                signing_method: "local_hmac".into(),
                key_id: "test-key".into(),
                signed_at: compile_time,
            },
        };
        state.security.semantic_hash = state.compute_semantic_hash().unwrap();
        state.security.state_hash = state.compute_state_hash().unwrap();
        state
    }

    #[test]
    fn test_status_finality() {
        assert!(TruthStatus::VerifiedTrue.is_final());
        assert!(TruthStatus::Expired.is_final());
        assert!(!TruthStatus::Pending.is_final());
        assert!(!TruthStatus::PendingHumanReview.is_final());
    }

    #[test]
    fn test_hashes_verify() {
        assert!(state().verify_hashes());
    }

    #[test]
    fn test_semantic_hash_stable_across_compile_time() {
        let a = state();
        let mut b = state();
        b.compile_inputs.compile_time = parse_datetime("2026-01-07T13:00:00Z").unwrap();
        assert_eq!(
            a.compute_semantic_hash().unwrap(),
            b.compute_semantic_hash().unwrap()
        );
        assert_ne!(
            a.compute_state_hash().unwrap(),
            b.compute_state_hash().unwrap()
        );
    }

    #[test]
    fn test_semantic_hash_stable_across_compiler_version() {
        let a = state();
        let mut b = state();
        b.compile_inputs.compiler_version = "1.0.1".into();
        assert_eq!(
            a.compute_semantic_hash().unwrap(),
            b.compute_semantic_hash().unwrap()
        );
        assert_ne!(
            a.compute_state_hash().unwrap(),
            b.compute_state_hash().unwrap()
        );
    }

    #[test]
    fn test_claim_mutation_changes_semantic_hash() {
        let a = state();
        let mut b = state();
        b.claim.insert("water_level_meters".into(), json!(1.26));
        assert_ne!(
            a.compute_semantic_hash().unwrap(),
            b.compute_semantic_hash().unwrap()
        );
        assert!(!b.verify_hashes());
    }

    #[test]
    fn test_flag_order_does_not_affect_hashes() {
        let mut a = state();
        let mut b = state();
        a.transparency_flags = vec!["B_FLAG".into(), "A_FLAG".into()];
        b.transparency_flags = vec!["A_FLAG".into(), "B_FLAG".into()];
        assert_eq!(
            a.compute_semantic_hash().unwrap(),
            b.compute_semantic_hash().unwrap()
        );
    }

    #[test]
    fn test_serde_round_trip_preserves_hashes() {
        let a = state();
        let text = serde_json::to_string(&a).unwrap();
        let b: TruthState = serde_json::from_str(&text).unwrap();
        assert_eq!(a, b);
        assert!(b.verify_hashes());
    }
}
