//! Protocol primitives: the data types the compiler and trust engine
//! exchange.
//!
//! Every primitive carries a `canonical()` projection — the exact value that
//! is hashed — and most carry a `hash()` built on
//! [`canonical_hash`](crate::canonical::canonical_hash). Primitives are
//! immutable once constructed; nothing here mutates after submission.

mod claim_type;
mod evidence;

#[cfg(test)]
pub(crate) use claim_type::test_support;
mod observation;
mod truth_key;
mod truth_state;
mod trust_snapshot;

pub use claim_type::{
    AutovalidationConfig, ClaimType, ClaimTypeError, ClaimTypeLoader, ConfidenceModel,
    ConfidenceThresholds, ConsensusModelConfig, DerivationConfig, EvidenceRequirements,
    FieldStrategy, IdStrategy, RiskProfile, TemporalDecayConfig, TruthKeyConfig,
    YamlClaimTypeLoader,
};
pub use evidence::EvidenceRef;
pub use observation::{GeoPoint, Observation, ReporterContext, StandingClass};
pub use truth_key::{
    Domain, SpatialSystem, TruthKey, TruthKeyError, TruthKeyInputs, build_truth_key,
    parse_truth_key,
};
pub use truth_state::{
    CompileInputs, ConfidenceBreakdown, ConsensusRecord, SecurityBlock, TruthState, TruthStatus,
    VerificationBasis,
};
pub use trust_snapshot::{AgentTrust, ContextModifiers, TrustSnapshot};
