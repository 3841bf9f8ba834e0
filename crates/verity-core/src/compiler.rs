//! The truth compiler.
//!
//! [`compile_truth_state`] is a pure function: it reads no wall clock, no
//! randomness, no network, no filesystem, and mutates none of its inputs.
//! Byte-identical inputs produce byte-identical output across environments.
//!
//! # Pipeline
//!
//! 1. Normalize and validate inputs (truth key, contract binding, snapshot
//!    hash).
//! 2. Resolve the admissibility floor and evaluate consensus over votes.
//! 3. Determine status and verification basis (lane rules, AI
//!    autovalidation, contradiction detection).
//! 4. Compute composite confidence.
//! 5. Derive the claim payload and validate it against the output schema.
//! 6. Assemble the state, compute `semantic_hash` and `state_hash`.
//! 7. Sign the `state_hash` — final statuses only; intermediate states
//!    carry hashes but no signature.
//!
//! Failure is atomic: every error path returns before anything is signed,
//! and errors that can occur after input gathering carry the compile-inputs
//! envelope for reproduction.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::canonical::{CanonicalError, quantize};
use crate::confidence::{ConfidenceInputs, compute_confidence};
use crate::consensus::{
    CandidateStatus, ValidationVote, evaluate_consensus, resolve_theta_min,
};
use crate::derivation::{DerivationError, derive_claim_payload};
use crate::primitives::{
    ClaimType, CompileInputs, Observation, RiskProfile, SecurityBlock, TruthState, TruthStatus,
    TrustSnapshot, VerificationBasis, parse_truth_key,
};
use crate::primitives::TruthKeyError;
use crate::schema::{CompiledSchema, SchemaViolation};
use crate::signing::{Signer, SigningError, sign_truth_state};

use thiserror::Error;

/// Compiler version; bumped whenever the algorithm changes.
pub const COMPILER_VERSION: &str = "1.0.0";

/// Transparency flags emitted by the compiler.
mod flag {
    pub const CONTRADICTION_DETECTED: &str = "CONTRADICTION_DETECTED";
    pub const LOW_COMPOSITE_CONFIDENCE: &str = "LOW_COMPOSITE_CONFIDENCE";
    pub const AI_RECOMMENDS_TRUE: &str = "AI_RECOMMENDS_TRUE";
    pub const AI_RECOMMENDS_FALSE: &str = "AI_RECOMMENDS_FALSE";
    pub const AWAITING_HUMAN_CONSENSUS: &str = "AWAITING_HUMAN_CONSENSUS";
}

/// Per-call context the orchestrator supplies alongside the core inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileContext<'a> {
    /// AI confidence per observation, aligned by index. Missing scores
    /// default to 0.5.
    pub ai_scores: Option<&'a [f64]>,
    /// Validation votes cast against this truth key.
    pub votes: &'a [ValidationVote],
    /// Policy baseline admissibility floor.
    pub policy_theta_min: f64,
    /// Probe-level tightening of the floor, when a probe demands one.
    pub probe_theta_min: Option<f64>,
    /// Whether the observation window is still open. Open windows yield
    /// intermediate leaning statuses instead of a final `INCONCLUSIVE`.
    pub window_open: bool,
    /// Explicit `signed_at` override recorded in the compile inputs.
    pub signed_at_override: Option<DateTime<Utc>>,
}

/// Errors from truth compilation. A closed set with stable codes; the
/// compiler never partially commits.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompileError {
    /// Observations are empty and the contract requires some.
    #[error("no evidence: contract requires at least {required} observation(s)")]
    NoEvidence {
        /// The contract's minimum.
        required: u32,
        /// Reproduction envelope.
        inputs: Box<CompileInputs>,
    },

    /// A required contract input is missing or inconsistent.
    #[error("contract violation: {reason}")]
    ContractViolation {
        /// What is missing or inconsistent.
        reason: String,
    },

    /// The derived claim payload was rejected by the output schema.
    #[error("schema violation: {violation}")]
    SchemaValidation {
        /// The first violation in canonical order.
        violation: SchemaViolation,
        /// Reproduction envelope.
        inputs: Box<CompileInputs>,
    },

    /// An input could not be canonicalized.
    #[error("non-canonical input: {0}")]
    NonCanonicalInput(#[from] CanonicalError),

    /// The truth key is malformed.
    #[error(transparent)]
    TruthKey(#[from] TruthKeyError),

    /// The trust snapshot's stored hash does not match its content.
    #[error("trust snapshot hash mismatch: expected {expected}, got {actual}")]
    TrustSnapshotHashMismatch {
        /// The recomputed hash.
        expected: String,
        /// The stored hash.
        actual: String,
    },

    /// The signing backend failed.
    #[error(transparent)]
    Signing(#[from] SigningError),
}

impl CompileError {
    /// Stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NoEvidence { .. } => "no_evidence",
            Self::ContractViolation { .. } => "contract_missing",
            Self::SchemaValidation { .. } => "schema_violation",
            Self::NonCanonicalInput(_) => "non_canonical_input",
            Self::TruthKey(e) => e.code(),
            Self::TrustSnapshotHashMismatch { .. } => "trust_snapshot_hash_mismatch",
            Self::Signing(e) => e.code(),
        }
    }
}

/// Compiles observations into a truth state.
///
/// Given identical inputs this produces byte-identical output; see the
/// module documentation for the pipeline.
///
/// Final statuses are signed over the `state_hash`; intermediate statuses
/// (open window, awaiting human review, contradiction) carry computed
/// hashes but an empty signature and must not be persisted as terminal.
///
/// # Errors
///
/// Returns a [`CompileError`] with a stable code; no partial state is ever
/// produced.
#[allow(clippy::too_many_arguments, clippy::too_many_lines)]
pub fn compile_truth_state(
    claim_type: &ClaimType,
    truth_key: &str,
    observations: &[Observation],
    trust_snapshot: &TrustSnapshot,
    policy_version: &str,
    compiler_version: &str,
    compile_time: DateTime<Utc>,
    ctx: &CompileContext<'_>,
    signer: &dyn Signer,
) -> Result<TruthState, CompileError> {
    let span = tracing::debug_span!(
        "compile_truth_state",
        truth_key,
        claim_type = %claim_type.id,
        observations = observations.len(),
    );
    let _guard = span.enter();

    // ------------------------------------------------------------------
    // 1. Normalize and validate inputs
    // ------------------------------------------------------------------

    let parsed_key = parse_truth_key(truth_key)?;
    if parsed_key.domain != claim_type.domain {
        return Err(CompileError::ContractViolation {
            reason: format!(
                "truth key domain '{}' does not match contract domain '{}'",
                parsed_key.domain.as_str(),
                claim_type.domain.as_str(),
            ),
        });
    }
    let truth_key = parsed_key.to_string();

    if !trust_snapshot.verify_hash() {
        return Err(CompileError::TrustSnapshotHashMismatch {
            expected: trust_snapshot
                .compute_hash()
                .unwrap_or_else(|_| String::new()),
            actual: trust_snapshot.snapshot_hash.clone(),
        });
    }

    let claim_type_hash = claim_type.hash()?;
    let mut observation_ids: Vec<String> = observations
        .iter()
        .map(|o| o.observation_id.clone())
        .collect();
    observation_ids.sort();

    let compile_inputs = CompileInputs {
        observation_ids: observation_ids.clone(),
        claim_type_id: claim_type.id.to_lowercase(),
        claim_type_hash: claim_type_hash.clone(),
        policy_version: policy_version.to_string(),
        compiler_version: compiler_version.to_string(),
        trust_snapshot_hash: trust_snapshot.snapshot_hash.clone(),
        compile_time,
    };

    if observations.is_empty() && claim_type.evidence.min_observations > 0 {
        return Err(CompileError::NoEvidence {
            required: claim_type.evidence.min_observations,
            inputs: Box::new(compile_inputs),
        });
    }
    for obs in observations {
        if !obs.claim_type.eq_ignore_ascii_case(&claim_type.id) {
            return Err(CompileError::ContractViolation {
                reason: format!(
                    "observation {} reports claim type '{}', contract is '{}'",
                    obs.observation_id, obs.claim_type, claim_type.id,
                ),
            });
        }
        if claim_type.evidence.require_evidence_refs && obs.evidence_refs.is_empty() {
            return Err(CompileError::ContractViolation {
                reason: format!(
                    "observation {} carries no evidence refs but the contract requires them",
                    obs.observation_id,
                ),
            });
        }
    }

    // ------------------------------------------------------------------
    // 2. AI aggregate and admissibility
    // ------------------------------------------------------------------

    if let Some(scores) = ctx.ai_scores {
        if scores.len() != observations.len() {
            return Err(CompileError::ContractViolation {
                reason: format!(
                    "{} AI scores provided for {} observations",
                    scores.len(),
                    observations.len(),
                ),
            });
        }
    }
    let scores: Vec<f64> = match ctx.ai_scores {
        Some(scores) => scores.to_vec(),
        None => vec![0.5; observations.len()],
    };
    let ai_mean = if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    };
    // Contradiction is measured as the spread between the strongest
    // disagreeing scores.
    let ai_spread = match (
        scores.iter().copied().reduce(f64::min),
        scores.iter().copied().reduce(f64::max),
    ) {
        (Some(min), Some(max)) => max - min,
        _ => 0.0,
    };

    let theta_min = resolve_theta_min(
        ctx.policy_theta_min,
        claim_type.consensus_model.theta_min,
        ctx.probe_theta_min,
    );
    let consensus = evaluate_consensus(claim_type, trust_snapshot, ctx.votes, theta_min);

    // ------------------------------------------------------------------
    // 3. Status determination
    // ------------------------------------------------------------------

    let latest_evidence_time = observations
        .iter()
        .map(Observation::latest_evidence_time)
        .max()
        .unwrap_or(compile_time);

    let contradiction = ai_spread > claim_type.consensus_model.disagreement_threshold;
    let expired = compile_time - latest_evidence_time
        > Duration::seconds(claim_type.temporal_decay.max_validity.total_seconds());

    let mut flags: Vec<String> = Vec::new();
    let (status, basis) = determine_status(
        claim_type,
        &consensus.candidate,
        consensus.basis,
        ai_mean,
        contradiction,
        expired,
        ctx.window_open,
        &mut flags,
    );

    // ------------------------------------------------------------------
    // 4. Confidence
    // ------------------------------------------------------------------

    let mut distinct_reporters: Vec<&str> =
        observations.iter().map(|o| o.reporter_id.as_str()).collect();
    distinct_reporters.sort_unstable();
    distinct_reporters.dedup();

    let mut evidence_refs: Vec<String> = observations
        .iter()
        .flat_map(|o| o.evidence_refs.iter())
        .map(|e| e.sha256.to_lowercase())
        .collect();
    evidence_refs.sort();
    evidence_refs.dedup();

    let agreement_ratio = if ctx.votes.is_empty() {
        (1.0 - ai_spread).clamp(0.0, 1.0)
    } else {
        consensus.record.positive_ratio
    };

    let confidence_breakdown = compute_confidence(
        &claim_type.confidence_model,
        &ConfidenceInputs {
            ai_confidence: ai_mean,
            observation_count: observations.len(),
            distinct_reporters: distinct_reporters.len(),
            evidence_count: evidence_refs.len(),
            agreement_ratio,
            contradiction,
            latest_evidence_time,
            compile_time,
            half_life: claim_type.temporal_decay.half_life,
        },
    );
    let confidence = confidence_breakdown.final_score;

    if status == TruthStatus::VerifiedTrue
        && confidence < claim_type.autovalidation.ai_verified_true_threshold
    {
        flags.push(flag::LOW_COMPOSITE_CONFIDENCE.to_string());
    }

    // ------------------------------------------------------------------
    // 5. Claim derivation and schema validation
    // ------------------------------------------------------------------

    let claim = derive_claim_payload(observations, trust_snapshot, claim_type).map_err(
        |DerivationError::EmptyObservations| CompileError::NoEvidence {
            required: claim_type.evidence.min_observations.max(1),
            inputs: Box::new(compile_inputs.clone()),
        },
    )?;

    let schema =
        CompiledSchema::compile(&claim_type.output_schema()).map_err(|e| {
            CompileError::ContractViolation {
                reason: format!("output schema does not compile: {e}"),
            }
        })?;
    let claim_value = Value::Object(
        claim
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    );
    schema
        .validate_first(&claim_value)
        .map_err(|violation| CompileError::SchemaValidation {
            violation,
            inputs: Box::new(compile_inputs.clone()),
        })?;

    // ------------------------------------------------------------------
    // 6. Assembly and hashing
    // ------------------------------------------------------------------

    flags.sort();
    flags.dedup();

    let signed_at = ctx.signed_at_override.unwrap_or(compile_time);
    let mut state = TruthState {
        truth_key,
        claim_type: claim_type.id.to_lowercase(),
        claim_type_hash,
        status,
        verification_basis: basis,
        claim,
        ai_confidence: quantize(ai_mean)?,
        confidence,
        confidence_breakdown: Some(confidence_breakdown),
        transparency_flags: flags,
        compile_inputs,
        evidence_refs,
        observation_ids,
        consensus: (!ctx.votes.is_empty()).then_some(consensus.record),
        security: SecurityBlock {
            semantic_hash: String::new(),
            state_hash: String::new(),
            signature: String::new(),
            signing_method: "pending".to_string(),
            key_id: "pending".to_string(),
            signed_at,
        },
    };

    // ------------------------------------------------------------------
    // 7. Signing — final statuses only
    // ------------------------------------------------------------------

    if status.is_final() {
        sign_truth_state(&mut state, signer, signed_at)?;
    } else {
        state.security.semantic_hash = state.compute_semantic_hash()?;
        state.security.state_hash = state.compute_state_hash()?;
    }

    tracing::debug!(
        status = status.as_str(),
        confidence = state.confidence,
        "compiled truth state"
    );
    Ok(state)
}

/// Merges the consensus candidate with lane rules, AI autovalidation,
/// contradiction, and expiry into the output status.
#[allow(clippy::too_many_arguments, clippy::fn_params_excessive_bools)]
fn determine_status(
    claim_type: &ClaimType,
    candidate: &CandidateStatus,
    consensus_basis: Option<VerificationBasis>,
    ai_mean: f64,
    contradiction: bool,
    expired: bool,
    window_open: bool,
    flags: &mut Vec<String>,
) -> (TruthStatus, Option<VerificationBasis>) {
    // Consensus that actually decided something wins outright.
    match candidate {
        CandidateStatus::VerifiedTrue => {
            return (TruthStatus::VerifiedTrue, consensus_basis);
        },
        CandidateStatus::VerifiedFalse => {
            return (TruthStatus::VerifiedFalse, consensus_basis);
        },
        CandidateStatus::PendingHumanReview => {
            flags.push(flag::AWAITING_HUMAN_CONSENSUS.to_string());
            return (TruthStatus::PendingHumanReview, None);
        },
        CandidateStatus::Inconclusive => {},
    }

    if expired {
        return (TruthStatus::Expired, Some(VerificationBasis::TimeoutDefault));
    }

    if contradiction {
        flags.push(flag::CONTRADICTION_DETECTED.to_string());
        return (TruthStatus::Undecided, None);
    }

    let auto = &claim_type.autovalidation;
    match claim_type.risk_profile {
        RiskProfile::Monitor => {
            if ai_mean >= auto.ai_verified_true_threshold {
                (
                    TruthStatus::VerifiedTrue,
                    Some(VerificationBasis::AiAutovalidation),
                )
            } else if ai_mean <= auto.ai_verified_false_threshold {
                (
                    TruthStatus::VerifiedFalse,
                    Some(VerificationBasis::AiAutovalidation),
                )
            } else if window_open {
                if ai_mean > 0.5 {
                    (TruthStatus::LeaningTrue, None)
                } else if ai_mean < 0.5 {
                    (TruthStatus::LeaningFalse, None)
                } else {
                    (TruthStatus::Undecided, None)
                }
            } else {
                (
                    TruthStatus::Inconclusive,
                    Some(VerificationBasis::TimeoutInconclusive),
                )
            }
        },
        RiskProfile::Critical => {
            // The critical lane never auto-verifies; AI opinions surface as
            // recommendations only.
            if ai_mean >= auto.ai_verified_true_threshold {
                flags.push(flag::AI_RECOMMENDS_TRUE.to_string());
            } else if ai_mean <= auto.ai_verified_false_threshold {
                flags.push(flag::AI_RECOMMENDS_FALSE.to_string());
            }
            flags.push(flag::AWAITING_HUMAN_CONSENSUS.to_string());
            (TruthStatus::PendingHumanReview, None)
        },
    }
}
