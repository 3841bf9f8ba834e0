//! Versioned trust policy.
//!
//! Every tunable constant of the trust engine lives here, not in code:
//! gains, penalties, decay, phase thresholds, the admissibility baseline,
//! network modifier bounds. Policies have lineage (`version`,
//! `parent_version`) and a canonical hash, and must pass the archetype
//! linter before activation.
//!
//! The policy is itself an agent (`policy:…`) and may gain or lose standing
//! like any other.
//!
//! # Constitutional rule
//!
//! Downstream actors — claim contracts, probes — may only *tighten*
//! `theta_min`, never loosen it below the policy baseline
//! (see [`crate::consensus::resolve_theta_min`]).

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::canonical::{CanonicalError, canonical_hash};
use crate::temporal::BucketDuration;

/// Standing bounds and initial values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundsConfig {
    /// Lower bound of standing.
    #[serde(default)]
    pub min: f64,
    /// Upper bound of standing.
    #[serde(default = "default_max_standing")]
    pub max: f64,
    /// Initial standing per role.
    #[serde(default = "default_initial_by_role")]
    pub initial_by_role: BTreeMap<String, f64>,
    /// Initial standing for roles not listed.
    #[serde(default = "default_initial")]
    pub default_initial: f64,
}

fn default_max_standing() -> f64 {
    1000.0
}

fn default_initial() -> f64 {
    400.0
}

fn default_initial_by_role() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("observer".to_string(), 400.0),
        ("validator".to_string(), 450.0),
        ("sensor".to_string(), 450.0),
        ("expert".to_string(), 500.0),
        ("authority".to_string(), 600.0),
        ("policy".to_string(), 500.0),
    ])
}

impl Default for BoundsConfig {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: default_max_standing(),
            initial_by_role: default_initial_by_role(),
            default_initial: default_initial(),
        }
    }
}

/// Gain and penalty coefficients for standing updates.
///
/// Penalties are sharper than gains; a confident-and-wrong vote is
/// amplified by `reckless_confidence`, and an accurate low-confidence vote
/// earns the small `calibrated_confidence` bonus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateCoefficients {
    /// Gain for a verified-correct observation.
    #[serde(default = "default_observation_correct")]
    pub observation_correct: f64,
    /// Penalty for a contradicted observation.
    #[serde(default = "default_observation_wrong")]
    pub observation_wrong: f64,
    /// Gain for a vote aligned with the outcome.
    #[serde(default = "default_vote_correct")]
    pub vote_correct: f64,
    /// Penalty for a vote against the outcome.
    #[serde(default = "default_vote_wrong")]
    pub vote_wrong: f64,
    /// Multiplier on the penalty when a wrong vote carried confidence at or
    /// above [`Self::reckless_threshold`].
    #[serde(default = "default_reckless")]
    pub reckless_confidence: f64,
    /// Additive bonus for a correct vote whose stated confidence was at or
    /// below [`Self::calibrated_threshold`].
    #[serde(default = "default_calibrated")]
    pub calibrated_confidence: f64,
    /// Confidence at or above which a wrong vote is reckless.
    #[serde(default = "default_reckless_threshold")]
    pub reckless_threshold: f64,
    /// Confidence at or below which a correct vote is calibrated.
    #[serde(default = "default_calibrated_threshold")]
    pub calibrated_threshold: f64,
}

fn default_observation_correct() -> f64 {
    8.0
}

fn default_observation_wrong() -> f64 {
    12.0
}

fn default_vote_correct() -> f64 {
    4.0
}

fn default_vote_wrong() -> f64 {
    6.0
}

fn default_reckless() -> f64 {
    2.0
}

fn default_calibrated() -> f64 {
    1.0
}

fn default_reckless_threshold() -> f64 {
    0.8
}

fn default_calibrated_threshold() -> f64 {
    0.5
}

impl Default for UpdateCoefficients {
    fn default() -> Self {
        Self {
            observation_correct: default_observation_correct(),
            observation_wrong: default_observation_wrong(),
            vote_correct: default_vote_correct(),
            vote_wrong: default_vote_wrong(),
            reckless_confidence: default_reckless(),
            calibrated_confidence: default_calibrated(),
            reckless_threshold: default_reckless_threshold(),
            calibrated_threshold: default_calibrated_threshold(),
        }
    }
}

/// Exponential decay toward the initial standing over inactivity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayConfig {
    /// Whether decay is applied at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Inactivity half-life.
    #[serde(default = "default_decay_half_life")]
    pub half_life: BucketDuration,
}

fn default_true() -> bool {
    true
}

fn default_decay_half_life() -> BucketDuration {
    BucketDuration::parse("P60D").expect("static duration")
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            half_life: default_decay_half_life(),
        }
    }
}

/// Phase transition thresholds and weight mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfig {
    /// Below this: dormant.
    #[serde(default = "default_theta1")]
    pub theta1: f64,
    /// At or above this: dominant.
    #[serde(default = "default_theta2")]
    pub theta2: f64,
    /// Weight multiplier in the dormant phase.
    #[serde(default = "default_dormant_multiplier")]
    pub dormant_multiplier: f64,
    /// Fraction of standing above `theta2` that still counts.
    #[serde(default = "default_dominant_fraction")]
    pub dominant_fraction: f64,
}

fn default_theta1() -> f64 {
    300.0
}

fn default_theta2() -> f64 {
    700.0
}

fn default_dormant_multiplier() -> f64 {
    0.1
}

fn default_dominant_fraction() -> f64 {
    0.3
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            theta1: default_theta1(),
            theta2: default_theta2(),
            dormant_multiplier: default_dormant_multiplier(),
            dominant_fraction: default_dominant_fraction(),
        }
    }
}

/// Agent phases derived from standing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Minimal influence.
    Dormant,
    /// Proportional influence.
    Active,
    /// Diminishing returns.
    Dominant,
}

/// Isolation penalty and grounding relief.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationConfig {
    /// Whether the isolation penalty is applied.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Isolation index at or above which the `ISOLATED` flag is raised.
    #[serde(default = "default_isolation_flag_threshold")]
    pub flag_threshold: f64,
    /// Fraction of the isolation index forgiven when the agent recently
    /// agreed with a calibrated sensor or authority.
    #[serde(default = "default_grounding_relief")]
    pub grounding_relief: f64,
}

fn default_isolation_flag_threshold() -> f64 {
    0.5
}

fn default_grounding_relief() -> f64 {
    0.5
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            flag_threshold: default_isolation_flag_threshold(),
            grounding_relief: default_grounding_relief(),
        }
    }
}

/// Network position modifier bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Maximum vouch inheritance depth.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    /// Weight lost per hop.
    #[serde(default = "default_hop_decay")]
    pub hop_decay: f64,
    /// Scale applied to the accumulated vouch weight.
    #[serde(default = "default_bonus_scale")]
    pub bonus_scale: f64,
    /// Cap on the network position multiplier.
    #[serde(default = "default_max_position")]
    pub max_position: f64,
}

fn default_max_depth() -> u32 {
    3
}

fn default_hop_decay() -> f64 {
    0.2
}

fn default_bonus_scale() -> f64 {
    0.05
}

fn default_max_position() -> f64 {
    1.1
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            hop_decay: default_hop_decay(),
            bonus_scale: default_bonus_scale(),
            max_position: default_max_position(),
        }
    }
}

/// Recent-activity multiplier configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityConfig {
    /// Window within which activity counts as recent.
    #[serde(default = "default_activity_window")]
    pub window: BucketDuration,
    /// Multiplier for stale agents.
    #[serde(default = "default_activity_min")]
    pub min_multiplier: f64,
    /// Multiplier for highly active agents.
    #[serde(default = "default_activity_max")]
    pub max_multiplier: f64,
}

fn default_activity_window() -> BucketDuration {
    BucketDuration::parse("P7D").expect("static duration")
}

fn default_activity_min() -> f64 {
    0.9
}

fn default_activity_max() -> f64 {
    1.1
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            window: default_activity_window(),
            min_multiplier: default_activity_min(),
            max_multiplier: default_activity_max(),
        }
    }
}

/// Telemetry bounds the linter checks against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Maximum share of total phase weight the top five agents may hold
    /// before a concentration alert fires.
    #[serde(default = "default_top5_share")]
    pub top5_weight_share_max: f64,
}

fn default_top5_share() -> f64 {
    0.65
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            top5_weight_share_max: default_top5_share(),
        }
    }
}

/// Standing class thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassThresholds {
    /// At or above: silver.
    #[serde(default = "default_silver")]
    pub silver: f64,
    /// At or above: expert.
    #[serde(default = "default_expert")]
    pub expert: f64,
    /// At or above: authority.
    #[serde(default = "default_authority")]
    pub authority: f64,
}

fn default_silver() -> f64 {
    100.0
}

fn default_expert() -> f64 {
    350.0
}

fn default_authority() -> f64 {
    600.0
}

impl Default for ClassThresholds {
    fn default() -> Self {
        Self {
            silver: default_silver(),
            expert: default_expert(),
            authority: default_authority(),
        }
    }
}

/// Errors loading or linting a policy.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PolicyError {
    /// The policy file could not be read.
    #[error("I/O error loading policy: {0}")]
    Io(#[from] std::io::Error),

    /// The policy YAML could not be parsed.
    #[error("policy parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The policy failed the archetype linter.
    #[error("policy failed lint: {}", failures.join("; "))]
    Lint {
        /// What the linter rejected.
        failures: Vec<String>,
        /// The report the failures came from.
        report: LintReport,
    },

    /// The requested policy version is not known.
    #[error("unknown policy version: {version}")]
    Unknown {
        /// The requested version.
        version: String,
    },

    /// Canonicalization of the policy body failed.
    #[error("policy canonicalization failed: {0}")]
    Canonical(#[from] CanonicalError),
}

impl PolicyError {
    /// Stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unknown { .. } => "policy_unknown",
            _ => "policy_invalid",
        }
    }
}

/// Report from the archetype linter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LintReport {
    /// Standing change of the honest-validator archetype.
    pub honest_delta: f64,
    /// Standing change of the spammer archetype.
    pub spammer_delta: f64,
    /// Standing change of the reckless-guesser archetype.
    pub reckless_delta: f64,
    /// Whether the synthetic monolith population tripped the concentration
    /// alert.
    pub concentration_alert: bool,
}

/// A versioned trust policy parameter bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustPolicy {
    /// Policy identity, e.g. `policy:verity`.
    pub policy_id: String,
    /// Semantic version of this bundle.
    pub version: String,
    /// The version this one derives from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_version: Option<String>,
    /// Standing bounds and initial values.
    #[serde(default)]
    pub bounds: BoundsConfig,
    /// Baseline admissibility floor. Contracts and probes may only raise
    /// it.
    #[serde(default = "default_theta_min")]
    pub theta_min: f64,
    /// Update coefficients.
    #[serde(default)]
    pub update: UpdateCoefficients,
    /// Steepness constant `K` in the bounded update
    /// `500 + 500·tanh((x − 500)/K)`.
    #[serde(default = "default_curve_k")]
    pub curve_k: f64,
    /// Decay configuration.
    #[serde(default)]
    pub decay: DecayConfig,
    /// Phase transitions.
    #[serde(default)]
    pub phases: PhaseConfig,
    /// Isolation penalty and grounding relief.
    #[serde(default)]
    pub isolation: IsolationConfig,
    /// Network modifier bounds.
    #[serde(default)]
    pub network: NetworkConfig,
    /// Recent-activity multiplier.
    #[serde(default)]
    pub activity: ActivityConfig,
    /// Standing class thresholds.
    #[serde(default)]
    pub class_thresholds: ClassThresholds,
    /// Telemetry bounds.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_theta_min() -> f64 {
    10.0
}

fn default_curve_k() -> f64 {
    500.0
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            policy_id: "policy:verity".to_string(),
            version: "1.0.0".to_string(),
            parent_version: None,
            bounds: BoundsConfig::default(),
            theta_min: default_theta_min(),
            update: UpdateCoefficients::default(),
            curve_k: default_curve_k(),
            decay: DecayConfig::default(),
            phases: PhaseConfig::default(),
            isolation: IsolationConfig::default(),
            network: NetworkConfig::default(),
            activity: ActivityConfig::default(),
            class_thresholds: ClassThresholds::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl TrustPolicy {
    /// Loads a policy from a YAML document.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] on I/O or parse failure.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// The policy's agent id: `"{policy_id}_v{version}"`.
    #[must_use]
    pub fn agent_id(&self) -> String {
        format!("{}_v{}", self.policy_id, self.version)
    }

    /// Initial standing for a role.
    #[must_use]
    pub fn initial_standing(&self, role: &str) -> f64 {
        self.bounds
            .initial_by_role
            .get(&role.to_lowercase())
            .copied()
            .unwrap_or(self.bounds.default_initial)
    }

    /// Standing class for a standing value.
    #[must_use]
    pub fn class_for(&self, standing: f64) -> &'static str {
        if standing >= self.class_thresholds.authority {
            "authority"
        } else if standing >= self.class_thresholds.expert {
            "expert"
        } else if standing >= self.class_thresholds.silver {
            "silver"
        } else {
            "bronze"
        }
    }

    /// The nonlinear bound: `500 + 500·tanh((x − 500)/K)`.
    #[must_use]
    pub fn bounded(&self, x: f64) -> f64 {
        500.0 + 500.0 * ((x - 500.0) / self.curve_k).tanh()
    }

    /// Applies a standing delta through the bounded update and clamps to
    /// the policy bounds.
    #[must_use]
    pub fn apply_delta(&self, standing: f64, delta: f64) -> f64 {
        self.bounded(standing + delta)
            .clamp(self.bounds.min, self.bounds.max)
    }

    /// The phase for a standing value.
    #[must_use]
    pub fn phase(&self, standing: f64) -> Phase {
        if standing < self.phases.theta1 {
            Phase::Dormant
        } else if standing < self.phases.theta2 {
            Phase::Active
        } else {
            Phase::Dominant
        }
    }

    /// The phase weight: `0.1·s` below θ₁, `s` in `[θ₁, θ₂)`, and
    /// `θ₂ + 0.3·(s − θ₂)` above.
    #[must_use]
    pub fn phase_weight(&self, standing: f64) -> f64 {
        match self.phase(standing) {
            Phase::Dormant => self.phases.dormant_multiplier * standing,
            Phase::Active => standing,
            Phase::Dominant => {
                self.phases.theta2 + self.phases.dominant_fraction * (standing - self.phases.theta2)
            },
        }
    }

    /// Lazy decay toward the initial standing:
    /// `s + (initial − s)·(1 − 0.5^(Δt/half_life))`.
    #[must_use]
    pub fn decay_standing(&self, standing: f64, initial: f64, elapsed_seconds: i64) -> f64 {
        if !self.decay.enabled || elapsed_seconds <= 0 {
            return standing;
        }
        let half_lives = elapsed_seconds as f64 / self.decay.half_life.total_seconds() as f64;
        standing + (initial - standing) * (1.0 - 0.5f64.powf(half_lives))
    }

    /// Canonical hash of the full parameter bundle.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError`] if the bundle cannot be canonicalized.
    pub fn hash(&self) -> Result<String, CanonicalError> {
        let value = serde_json::to_value(self).unwrap_or_else(|_| json!(null));
        canonical_hash(&value)
    }

    /// Runs the archetype linter.
    ///
    /// Four synthetic populations are simulated under this policy:
    ///
    /// - an honest validator must trend up;
    /// - a spammer (activity with no verified outcomes) must stay flat;
    /// - a reckless guesser (confidently wrong) must trend down;
    /// - a malicious monolith (five dominant agents over a dormant crowd)
    ///   must trip the concentration alert.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Lint`] listing every archetype the policy
    /// fails.
    pub fn lint(&self) -> Result<LintReport, PolicyError> {
        const ROUNDS: usize = 20;

        let initial = self.initial_standing("observer");

        // Honest validator: verified-correct observations at healthy
        // confidence.
        let mut honest = initial;
        for _ in 0..ROUNDS {
            honest = self.apply_delta(honest, self.update.observation_correct * 0.9);
        }

        // Spammer: submissions that never get verified move nothing.
        let spammer = initial;

        // Reckless guesser: wrong votes at maximum stated confidence.
        let mut reckless = initial;
        for _ in 0..ROUNDS {
            let penalty = self.update.vote_wrong * self.update.reckless_confidence;
            reckless = self.apply_delta(reckless, -penalty);
        }

        // Malicious monolith: five agents near the ceiling over a dormant
        // crowd.
        let dominant_weight = self.phase_weight(900.0) * 5.0;
        let crowd_weight = self.phase_weight(150.0) * 20.0;
        let top5_share = dominant_weight / (dominant_weight + crowd_weight);
        let concentration_alert = top5_share > self.telemetry.top5_weight_share_max;

        let report = LintReport {
            honest_delta: honest - initial,
            spammer_delta: spammer - initial,
            reckless_delta: reckless - initial,
            concentration_alert,
        };

        let mut failures = Vec::new();
        if report.honest_delta <= 10.0 {
            failures.push(format!(
                "honest validator must trend up (delta {:.1})",
                report.honest_delta
            ));
        }
        if report.spammer_delta.abs() > 1.0 {
            failures.push(format!(
                "spammer must stay flat (delta {:.1})",
                report.spammer_delta
            ));
        }
        if report.reckless_delta >= -10.0 {
            failures.push(format!(
                "reckless guesser must trend down (delta {:.1})",
                report.reckless_delta
            ));
        }
        if !report.concentration_alert {
            failures.push("monolith population must raise a concentration alert".to_string());
        }

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(PolicyError::Lint { failures, report })
        }
    }
}
