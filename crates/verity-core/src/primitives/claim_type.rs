//! Claim type contracts.
//!
//! A claim type is an immutable YAML contract identified by
//! `{namespace}.{name}.v{major}` and by the canonical hash of its full body.
//! Contracts are never mutated; new versions supersede old ones. The
//! contract governs truth key formation, consensus, confidence scoring,
//! claim derivation, and the output schema.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::canonical::{CanonicalError, canonical_hash, quantize};
use crate::temporal::BucketDuration;

use super::truth_key::{Domain, SpatialSystem};

/// Verification lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskProfile {
    /// Monitor lane: AI may auto-verify above contract thresholds.
    #[default]
    Monitor,
    /// Critical lane: finalizing `VERIFIED_TRUE` requires human quorum.
    Critical,
}

impl RiskProfile {
    /// The lowercase canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Monitor => "monitor",
            Self::Critical => "critical",
        }
    }
}

/// Spatial id strategies for `spatial_system = meta`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// Spatial id from the artifact content hash (32 hex chars).
    #[default]
    ContentHash,
    /// Spatial id from a caller-provided stable id.
    ProvidedId,
    /// Content hash when present, else the provided id.
    Hybrid,
}

impl IdStrategy {
    /// The snake_case canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ContentHash => "content_hash",
            Self::ProvidedId => "provided_id",
            Self::Hybrid => "hybrid",
        }
    }
}

/// Truth key formation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruthKeyConfig {
    /// Spatial indexing system.
    pub spatial_system: SpatialSystem,
    /// Resolution for the spatial system (H3 resolution, HEALPix nside, ...).
    #[serde(default = "default_resolution")]
    pub resolution: u32,
    /// Vertical index segment.
    #[serde(default = "default_z_index")]
    pub z_index: String,
    /// Bucket duration for the time segment.
    #[serde(default = "default_time_bucket")]
    pub time_bucket: BucketDuration,
    /// Identity strategy; only meaningful for `spatial_system = meta`.
    #[serde(default)]
    pub id_strategy: IdStrategy,
}

fn default_resolution() -> u32 {
    8
}

fn default_z_index() -> String {
    "surface".to_string()
}

fn default_time_bucket() -> BucketDuration {
    BucketDuration::parse("PT1H").expect("static duration")
}

impl Default for TruthKeyConfig {
    fn default() -> Self {
        Self {
            spatial_system: SpatialSystem::H3,
            resolution: default_resolution(),
            z_index: default_z_index(),
            time_bucket: default_time_bucket(),
            id_strategy: IdStrategy::default(),
        }
    }
}

/// Consensus model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusModelConfig {
    /// Model identifier; `weighted_threshold` is the default and only
    /// built-in model.
    #[serde(default = "default_consensus_model")]
    pub model: String,
    /// Score at or above which the state finalizes `VERIFIED_TRUE`.
    #[serde(default = "default_finalize_threshold")]
    pub finalize_threshold: f64,
    /// Score at or below which the state finalizes `VERIFIED_FALSE`.
    #[serde(default = "default_reject_threshold")]
    pub reject_threshold: f64,
    /// Vote weight per standing class.
    #[serde(default = "default_weighted_roles")]
    pub weighted_roles: BTreeMap<String, f64>,
    /// Contract-level admissibility floor; may only tighten the policy
    /// baseline, never loosen it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theta_min: Option<f64>,
    /// Minimum distinct human validators for the critical lane.
    #[serde(default = "default_human_quorum")]
    pub human_quorum: u32,
    /// AI confidence gap above which contradiction is flagged.
    #[serde(default = "default_disagreement_threshold")]
    pub disagreement_threshold: f64,
}

fn default_consensus_model() -> String {
    "weighted_threshold".to_string()
}

fn default_finalize_threshold() -> f64 {
    15.0
}

fn default_reject_threshold() -> f64 {
    -10.0
}

fn default_weighted_roles() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("bronze".to_string(), 1.0),
        ("silver".to_string(), 3.0),
        ("expert".to_string(), 7.0),
        ("authority".to_string(), 10.0),
    ])
}

fn default_human_quorum() -> u32 {
    1
}

fn default_disagreement_threshold() -> f64 {
    0.30
}

impl Default for ConsensusModelConfig {
    fn default() -> Self {
        Self {
            model: default_consensus_model(),
            finalize_threshold: default_finalize_threshold(),
            reject_threshold: default_reject_threshold(),
            weighted_roles: default_weighted_roles(),
            theta_min: None,
            human_quorum: default_human_quorum(),
            disagreement_threshold: default_disagreement_threshold(),
        }
    }
}

impl ConsensusModelConfig {
    /// Vote weight for a standing class; unknown classes weigh 1.
    #[must_use]
    pub fn role_weight(&self, class: &str) -> f64 {
        self.weighted_roles
            .get(&class.to_lowercase())
            .copied()
            .unwrap_or(1.0)
    }
}

/// AI autovalidation thresholds for the monitor lane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutovalidationConfig {
    /// Mean AI confidence at or above which the monitor lane auto-verifies
    /// true.
    #[serde(default = "default_ai_true")]
    pub ai_verified_true_threshold: f64,
    /// Mean AI confidence at or below which the monitor lane auto-verifies
    /// false.
    #[serde(default = "default_ai_false")]
    pub ai_verified_false_threshold: f64,
}

fn default_ai_true() -> f64 {
    0.82
}

fn default_ai_false() -> f64 {
    0.20
}

impl Default for AutovalidationConfig {
    fn default() -> Self {
        Self {
            ai_verified_true_threshold: default_ai_true(),
            ai_verified_false_threshold: default_ai_false(),
        }
    }
}

/// Temporal decay of confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalDecayConfig {
    /// Half-life of the time-decay confidence modifier.
    #[serde(default = "default_half_life")]
    pub half_life: BucketDuration,
    /// Maximum validity window before a state expires.
    #[serde(default = "default_max_validity")]
    pub max_validity: BucketDuration,
}

fn default_half_life() -> BucketDuration {
    BucketDuration::parse("PT6H").expect("static duration")
}

fn default_max_validity() -> BucketDuration {
    BucketDuration::parse("P3D").expect("static duration")
}

impl Default for TemporalDecayConfig {
    fn default() -> Self {
        Self {
            half_life: default_half_life(),
            max_validity: default_max_validity(),
        }
    }
}

/// Evidence requirements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRequirements {
    /// Minimum number of observations for a compile to proceed.
    #[serde(default = "default_min_observations")]
    pub min_observations: u32,
    /// Whether every observation must carry at least one evidence
    /// reference.
    #[serde(default)]
    pub require_evidence_refs: bool,
}

fn default_min_observations() -> u32 {
    1
}

impl Default for EvidenceRequirements {
    fn default() -> Self {
        Self {
            min_observations: default_min_observations(),
            require_evidence_refs: false,
        }
    }
}

/// Confidence level thresholds for the derived label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    /// At or above: `high`.
    #[serde(default = "default_high")]
    pub high: f64,
    /// At or above (below `high`): `medium`.
    #[serde(default = "default_medium")]
    pub medium: f64,
}

fn default_high() -> f64 {
    0.80
}

fn default_medium() -> f64 {
    0.50
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            high: default_high(),
            medium: default_medium(),
        }
    }
}

/// Composite confidence model: declared components and modifiers.
///
/// Components not declared here default to zero weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceModel {
    /// Component name to weight. Known components: `ai_confidence`,
    /// `multi_source`, `evidence_density`, `agreement_ratio`.
    #[serde(default = "default_components")]
    pub components: BTreeMap<String, f64>,
    /// Modifier name to value. Known modifiers: `time_decay` (scale of the
    /// decay penalty), `low_evidence_penalty`, `contradiction_penalty`.
    #[serde(default)]
    pub modifiers: BTreeMap<String, f64>,
    /// Level thresholds.
    #[serde(default)]
    pub thresholds: ConfidenceThresholds,
}

fn default_components() -> BTreeMap<String, f64> {
    BTreeMap::from([("ai_confidence".to_string(), 1.0)])
}

impl Default for ConfidenceModel {
    fn default() -> Self {
        Self {
            components: default_components(),
            modifiers: BTreeMap::new(),
            thresholds: ConfidenceThresholds::default(),
        }
    }
}

/// Per-field claim derivation strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStrategy {
    /// Continuous weighted median of numeric values, weights from effective
    /// power.
    WeightedMedian,
    /// Majority of enumerated values; ties break by canonical bytes.
    Majority,
    /// Union of evidence counts across observations.
    EvidenceUnion,
}

impl FieldStrategy {
    /// The snake_case canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WeightedMedian => "weighted_median",
            Self::Majority => "majority",
            Self::EvidenceUnion => "evidence_union",
        }
    }
}

/// Claim derivation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DerivationConfig {
    /// Output field name to derivation strategy. The input field read from
    /// observation payloads shares the name unless `source_fields` remaps
    /// it.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldStrategy>,
    /// Optional remap of output field to source payload field.
    #[serde(default)]
    pub source_fields: BTreeMap<String, String>,
}

/// Errors loading or validating claim contracts.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClaimTypeError {
    /// The contract file could not be read.
    #[error("I/O error loading contract: {0}")]
    Io(#[from] std::io::Error),

    /// The contract YAML could not be parsed.
    #[error("contract parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The contract was not found by the loader.
    #[error("contract not found: {id}")]
    NotFound {
        /// The requested contract id.
        id: String,
    },

    /// The contract body hashes differently than the pinned hash.
    #[error("contract hash mismatch for {id}: expected {expected}, got {actual}")]
    HashMismatch {
        /// The contract id.
        id: String,
        /// The pinned hash.
        expected: String,
        /// The computed hash.
        actual: String,
    },

    /// Domain and spatial system are incompatible.
    #[error("invalid contract config: {reason}")]
    InvalidConfig {
        /// Why the configuration is invalid.
        reason: String,
    },

    /// Canonicalization of the contract body failed.
    #[error("contract canonicalization failed: {0}")]
    Canonical(#[from] CanonicalError),
}

impl ClaimTypeError {
    /// Stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "contract_missing",
            Self::HashMismatch { .. } => "contract_hash_mismatch",
            _ => "contract_invalid",
        }
    }
}

/// An immutable claim type contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimType {
    /// Canonical id: `{namespace}.{name}.v{major}`, e.g. `earth.flood.v1`.
    pub id: String,
    /// Major version; bumped on any contract change.
    pub version: u32,
    /// Claim domain.
    pub domain: Domain,
    /// Claim topic.
    pub topic: String,
    /// Verification lane.
    #[serde(default)]
    pub risk_profile: RiskProfile,
    /// Truth key formation.
    #[serde(default)]
    pub truthkey: TruthKeyConfig,
    /// Consensus model.
    #[serde(default)]
    pub consensus_model: ConsensusModelConfig,
    /// AI autovalidation thresholds.
    #[serde(default)]
    pub autovalidation: AutovalidationConfig,
    /// Temporal decay.
    #[serde(default)]
    pub temporal_decay: TemporalDecayConfig,
    /// Evidence requirements.
    #[serde(default)]
    pub evidence: EvidenceRequirements,
    /// Composite confidence model.
    #[serde(default)]
    pub confidence_model: ConfidenceModel,
    /// Claim derivation rules.
    #[serde(default)]
    pub derivation: DerivationConfig,
    /// AI-ladder routing hints, opaque to the core.
    #[serde(default)]
    pub ai_routing: BTreeMap<String, String>,
    /// Inline output schema for `TruthState.claim`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Reference to an external schema document, resolved by the loader.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema_ref: Option<String>,
}

impl ClaimType {
    /// The canonical projection of the full contract body, used for the
    /// contract hash.
    #[must_use]
    pub fn canonical(&self) -> Value {
        let mut truthkey = Map::new();
        truthkey.insert(
            "spatial_system".into(),
            json!(self.truthkey.spatial_system.as_str()),
        );
        truthkey.insert("resolution".into(), json!(self.truthkey.resolution));
        truthkey.insert("z_index".into(), json!(self.truthkey.z_index.to_lowercase()));
        truthkey.insert(
            "time_bucket".into(),
            json!(self.truthkey.time_bucket.as_iso8601()),
        );
        if self.truthkey.spatial_system == SpatialSystem::Meta {
            truthkey.insert("id_strategy".into(), json!(self.truthkey.id_strategy.as_str()));
        }

        let consensus = json!({
            "model": self.consensus_model.model,
            "finalize_threshold": self.consensus_model.finalize_threshold,
            "reject_threshold": self.consensus_model.reject_threshold,
            "weighted_roles": self.consensus_model.weighted_roles,
            "theta_min": self.consensus_model.theta_min,
            "human_quorum": self.consensus_model.human_quorum,
            "disagreement_threshold": self.consensus_model.disagreement_threshold,
        });

        let confidence = json!({
            "components": self.confidence_model.components,
            "modifiers": self.confidence_model.modifiers,
            "thresholds": {
                "high": self.confidence_model.thresholds.high,
                "medium": self.confidence_model.thresholds.medium,
            },
        });

        let derivation = json!({
            "fields": self
                .derivation
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), json!(v.as_str())))
                .collect::<Map<String, Value>>(),
            "source_fields": self.derivation.source_fields,
        });

        json!({
            "id": self.id.to_lowercase(),
            "version": self.version,
            "domain": self.domain.as_str(),
            "topic": self.topic.to_lowercase(),
            "risk_profile": self.risk_profile.as_str(),
            "truthkey": Value::Object(truthkey),
            "consensus_model": consensus,
            "autovalidation": {
                "ai_verified_true_threshold":
                    quantize(self.autovalidation.ai_verified_true_threshold).unwrap_or(0.0),
                "ai_verified_false_threshold":
                    quantize(self.autovalidation.ai_verified_false_threshold).unwrap_or(0.0),
            },
            "temporal_decay": {
                "half_life": self.temporal_decay.half_life.as_iso8601(),
                "max_validity": self.temporal_decay.max_validity.as_iso8601(),
            },
            "evidence": {
                "min_observations": self.evidence.min_observations,
                "require_evidence_refs": self.evidence.require_evidence_refs,
            },
            "confidence_model": confidence,
            "derivation": derivation,
            "ai_routing": self.ai_routing,
            "output_schema": self.output_schema,
            "output_schema_ref": self.output_schema_ref,
        })
    }

    /// Computes the canonical contract hash identifying this exact version.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError`] if the contract body cannot be
    /// canonicalized.
    pub fn hash(&self) -> Result<String, CanonicalError> {
        canonical_hash(&self.canonical())
    }

    /// The output schema for claim payload validation; permissive object
    /// schema when the contract declares none.
    #[must_use]
    pub fn output_schema(&self) -> Value {
        self.output_schema
            .clone()
            .unwrap_or_else(|| json!({"type": "object"}))
    }

    /// Validates that domain and spatial system are a permitted
    /// combination and that `id_strategy` is only customized for meta.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimTypeError::InvalidConfig`] on a forbidden
    /// combination.
    pub fn validate_domain_config(&self) -> Result<(), ClaimTypeError> {
        let allowed: &[SpatialSystem] = match self.domain {
            Domain::Earth | Domain::Ocean => &[SpatialSystem::H3, SpatialSystem::Geohash],
            Domain::Space => &[SpatialSystem::Healpix],
            Domain::Meta => &[SpatialSystem::Meta],
        };
        if !allowed.contains(&self.truthkey.spatial_system) {
            return Err(ClaimTypeError::InvalidConfig {
                reason: format!(
                    "domain {} requires spatial_system in {:?}, got {}",
                    self.domain.as_str(),
                    allowed.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
                    self.truthkey.spatial_system.as_str(),
                ),
            });
        }
        if self.truthkey.spatial_system != SpatialSystem::Meta
            && self.truthkey.id_strategy != IdStrategy::ContentHash
        {
            return Err(ClaimTypeError::InvalidConfig {
                reason: "id_strategy is only applicable when spatial_system is meta".into(),
            });
        }
        Ok(())
    }
}

/// Capability for loading claim contracts.
///
/// Implementations cache by `(id, hash)`; a contract body is immutable once
/// released, so a cache hit never needs revalidation.
pub trait ClaimTypeLoader {
    /// Loads the contract for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimTypeError::NotFound`] for unknown ids.
    fn load(&self, id: &str) -> Result<Arc<ClaimType>, ClaimTypeError>;

    /// Loads the contract for `id` and verifies it against a pinned hash.
    ///
    /// Compile inputs record the contract hash; replaying a compilation
    /// loads the contract through this method so a silently substituted
    /// body is caught.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimTypeError::HashMismatch`] when the loaded body hashes
    /// differently than `expected_hash`.
    fn load_pinned(
        &self,
        id: &str,
        expected_hash: &str,
    ) -> Result<Arc<ClaimType>, ClaimTypeError> {
        let contract = self.load(id)?;
        let actual = contract.hash()?;
        if actual != expected_hash.to_lowercase() {
            return Err(ClaimTypeError::HashMismatch {
                id: id.to_string(),
                expected: expected_hash.to_lowercase(),
                actual,
            });
        }
        Ok(contract)
    }
}

/// Loads claim contracts from a directory of YAML documents named
/// `{id}.yaml`.
pub struct YamlClaimTypeLoader {
    dir: PathBuf,
    cache: RwLock<HashMap<String, (String, Arc<ClaimType>)>>,
}

impl YamlClaimTypeLoader {
    /// Creates a loader rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn load_from_disk(&self, id: &str) -> Result<ClaimType, ClaimTypeError> {
        let path = self.dir.join(format!("{id}.yaml"));
        if !path.exists() {
            return Err(ClaimTypeError::NotFound { id: id.to_string() });
        }
        let text = std::fs::read_to_string(&path)?;
        let contract: ClaimType = serde_yaml::from_str(&text)?;
        contract.validate_domain_config()?;
        Ok(contract)
    }
}

impl ClaimTypeLoader for YamlClaimTypeLoader {
    fn load(&self, id: &str) -> Result<Arc<ClaimType>, ClaimTypeError> {
        if let Some((_, cached)) = self.cache.read().expect("lock poisoned").get(id) {
            return Ok(Arc::clone(cached));
        }
        let contract = self.load_from_disk(id)?;
        let hash = contract.hash()?;
        let contract = Arc::new(contract);
        self.cache
            .write()
            .expect("lock poisoned")
            .insert(id.to_string(), (hash, Arc::clone(&contract)));
        tracing::debug!(contract_id = id, "loaded claim contract");
        Ok(contract)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Contract fixtures shared across unit tests.

    use serde_json::json;

    use super::*;

    /// An hourly earth.flood.v1 monitor-lane contract matching the shapes
    /// used throughout the test suite.
    #[must_use]
    pub fn flood_contract() -> ClaimType {
        ClaimType {
            id: "earth.flood.v1".into(),
            version: 1,
            domain: Domain::Earth,
            topic: "flood".into(),
            risk_profile: RiskProfile::Monitor,
            truthkey: TruthKeyConfig::default(),
            consensus_model: ConsensusModelConfig::default(),
            autovalidation: AutovalidationConfig::default(),
            temporal_decay: TemporalDecayConfig::default(),
            evidence: EvidenceRequirements::default(),
            confidence_model: ConfidenceModel::default(),
            derivation: DerivationConfig {
                fields: BTreeMap::from([
                    ("water_level_meters".to_string(), FieldStrategy::WeightedMedian),
                    ("severity".to_string(), FieldStrategy::Majority),
                ]),
                source_fields: BTreeMap::from([(
                    "water_level_meters".to_string(),
                    "water_level".to_string(),
                )]),
            },
            ai_routing: BTreeMap::new(),
            output_schema: Some(json!({
                "type": "object",
                "properties": {
                    "water_level_meters": {"type": "number", "minimum": 0.0},
                    "severity": {"type": "string"},
                    "observation_count": {"type": "integer", "minimum": 1},
                    "network_trust": {"type": "number"},
                },
                "required": ["observation_count"],
            })),
            output_schema_ref: None,
        }
    }

    /// A meta-domain research artifact contract.
    #[must_use]
    pub fn meta_contract() -> ClaimType {
        let mut contract = flood_contract();
        contract.id = "meta.research_artifact.v1".into();
        contract.domain = Domain::Meta;
        contract.topic = "research_artifact".into();
        contract.truthkey = TruthKeyConfig {
            spatial_system: SpatialSystem::Meta,
            resolution: 0,
            z_index: "knowledge".into(),
            time_bucket: BucketDuration::parse("P1D").expect("static duration"),
            id_strategy: IdStrategy::ContentHash,
        };
        contract.derivation = DerivationConfig::default();
        contract.output_schema = Some(json!({"type": "object"}));
        contract
    }
}
