//! Composite confidence scoring.
//!
//! `confidence = clamp(Σ component_weight × component_value + Σ modifiers,
//! 0, 1)`, quantized to six decimals. Components and modifiers are declared
//! in the claim contract; anything not declared has zero weight. The full
//! breakdown is preserved on the truth state for audit.

use chrono::{DateTime, Utc};

use crate::canonical::quantize;
use crate::primitives::{ConfidenceBreakdown, ConfidenceModel};
use crate::temporal::BucketDuration;

/// Measured inputs to the confidence computation.
///
/// The compiler assembles these from observations, votes, and the contract;
/// this module only does arithmetic over them.
#[derive(Debug, Clone)]
pub struct ConfidenceInputs {
    /// Mean AI confidence over the observations.
    pub ai_confidence: f64,
    /// Number of observations.
    pub observation_count: usize,
    /// Number of distinct reporters.
    pub distinct_reporters: usize,
    /// Number of distinct evidence references.
    pub evidence_count: usize,
    /// Agreement among validators/observations in `[0, 1]`.
    pub agreement_ratio: f64,
    /// Whether contradiction was detected.
    pub contradiction: bool,
    /// Most recent evidence time across observations.
    pub latest_evidence_time: DateTime<Utc>,
    /// The explicit compile time.
    pub compile_time: DateTime<Utc>,
    /// Contract decay half-life.
    pub half_life: BucketDuration,
}

/// Component names recognized by the scorer.
mod component {
    pub const AI_CONFIDENCE: &str = "ai_confidence";
    pub const MULTI_SOURCE: &str = "multi_source";
    pub const EVIDENCE_DENSITY: &str = "evidence_density";
    pub const AGREEMENT_RATIO: &str = "agreement_ratio";
}

/// Modifier names recognized by the scorer.
mod modifier {
    pub const TIME_DECAY: &str = "time_decay";
    pub const LOW_EVIDENCE_PENALTY: &str = "low_evidence_penalty";
    pub const CONTRADICTION_PENALTY: &str = "contradiction_penalty";
}

/// Computes composite confidence under a contract's confidence model.
#[must_use]
pub fn compute_confidence(model: &ConfidenceModel, inputs: &ConfidenceInputs) -> ConfidenceBreakdown {
    let mut breakdown = ConfidenceBreakdown::default();
    let mut raw = 0.0;

    for (name, weight) in &model.components {
        let value = component_value(name, inputs);
        let contribution = weight * value;
        breakdown
            .components
            .insert(name.clone(), quantize(contribution).unwrap_or(0.0));
        raw += contribution;
    }

    for (name, value) in &model.modifiers {
        if let Some(applied) = modifier_value(name, *value, inputs) {
            breakdown
                .modifiers
                .insert(name.clone(), quantize(applied).unwrap_or(0.0));
            raw += applied;
        }
    }

    breakdown.raw_score = quantize(raw).unwrap_or(0.0);
    breakdown.final_score = quantize(raw.clamp(0.0, 1.0)).unwrap_or(0.0);
    breakdown
}

/// The value of a named component; unknown components measure zero.
fn component_value(name: &str, inputs: &ConfidenceInputs) -> f64 {
    match name {
        component::AI_CONFIDENCE => inputs.ai_confidence,
        // 0 for a single source, approaching 1 with more distinct
        // reporters.
        component::MULTI_SOURCE => {
            if inputs.distinct_reporters <= 1 {
                0.0
            } else {
                1.0 - 1.0 / inputs.distinct_reporters as f64
            }
        },
        // Saturates at two evidence references per observation.
        component::EVIDENCE_DENSITY => {
            if inputs.observation_count == 0 {
                0.0
            } else {
                let per_obs =
                    inputs.evidence_count as f64 / (2.0 * inputs.observation_count as f64);
                per_obs.min(1.0)
            }
        },
        component::AGREEMENT_RATIO => inputs.agreement_ratio,
        _ => 0.0,
    }
}

/// The applied value of a named modifier, or `None` when its trigger
/// condition is absent.
fn modifier_value(name: &str, declared: f64, inputs: &ConfidenceInputs) -> Option<f64> {
    match name {
        modifier::TIME_DECAY => {
            let elapsed = (inputs.compile_time - inputs.latest_evidence_time)
                .num_seconds()
                .max(0);
            if elapsed == 0 {
                return None;
            }
            let half_lives = elapsed as f64 / inputs.half_life.total_seconds() as f64;
            // The declared value scales a [0, 1) decay fraction; a negative
            // declaration subtracts more as evidence ages.
            Some(declared * (1.0 - 0.5f64.powf(half_lives)))
        },
        modifier::LOW_EVIDENCE_PENALTY => (inputs.evidence_count == 0).then_some(declared),
        modifier::CONTRADICTION_PENALTY => inputs.contradiction.then_some(declared),
        _ => None,
    }
}

/// Derives the confidence level label from contract thresholds.
#[must_use]
pub fn confidence_level(score: f64, model: &ConfidenceModel) -> &'static str {
    if score >= model.thresholds.high {
        "high"
    } else if score >= model.thresholds.medium {
        "medium"
    } else {
        "low"
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::temporal::parse_datetime;

    use super::*;

    fn inputs() -> ConfidenceInputs {
        ConfidenceInputs {
            ai_confidence: 0.91,
            observation_count: 2,
            distinct_reporters: 2,
            evidence_count: 2,
            agreement_ratio: 1.0,
            contradiction: false,
            latest_evidence_time: parse_datetime("2026-01-07T11:30:00Z").unwrap(),
            compile_time: parse_datetime("2026-01-07T12:00:00Z").unwrap(),
            half_life: BucketDuration::parse("PT6H").unwrap(),
        }
    }

    fn model(components: &[(&str, f64)], modifiers: &[(&str, f64)]) -> ConfidenceModel {
        ConfidenceModel {
            components: components
                .iter()
                .map(|(k, v)| ((*k).to_string(), *v))
                .collect(),
            modifiers: modifiers
                .iter()
                .map(|(k, v)| ((*k).to_string(), *v))
                .collect(),
            thresholds: crate::primitives::ConfidenceThresholds::default(),
        }
    }

    #[test]
    fn test_single_component_passthrough() {
        let breakdown = compute_confidence(&model(&[("ai_confidence", 1.0)], &[]), &inputs());
        assert!((breakdown.final_score - 0.91).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_components_sum() {
        let m = model(
            &[("ai_confidence", 0.6), ("multi_source", 0.2), ("agreement_ratio", 0.2)],
            &[],
        );
        let breakdown = compute_confidence(&m, &inputs());
        // 0.6*0.91 + 0.2*0.5 + 0.2*1.0 = 0.846
        assert!((breakdown.final_score - 0.846).abs() < 1e-9);
        assert_eq!(breakdown.components.len(), 3);
    }

    #[test]
    fn test_unknown_component_has_zero_weight() {
        let m = model(&[("ai_confidence", 1.0), ("lunar_phase", 0.5)], &[]);
        let breakdown = compute_confidence(&m, &inputs());
        assert!((breakdown.final_score - 0.91).abs() < 1e-9);
        assert!((breakdown.components["lunar_phase"]).abs() < f64::EPSILON);
    }

    #[test]
    fn test_contradiction_penalty_applied() {
        let m = model(&[("ai_confidence", 1.0)], &[("contradiction_penalty", -0.2)]);
        let mut contradicted = inputs();
        contradicted.contradiction = true;
        let breakdown = compute_confidence(&m, &contradicted);
        assert!((breakdown.final_score - 0.71).abs() < 1e-9);
        assert!(breakdown.modifiers.contains_key("contradiction_penalty"));

        // Without the trigger the modifier is absent from the breakdown.
        let clean = compute_confidence(&m, &inputs());
        assert!(!clean.modifiers.contains_key("contradiction_penalty"));
    }

    #[test]
    fn test_low_evidence_penalty() {
        let m = model(&[("ai_confidence", 1.0)], &[("low_evidence_penalty", -0.1)]);
        let mut no_evidence = inputs();
        no_evidence.evidence_count = 0;
        let breakdown = compute_confidence(&m, &no_evidence);
        assert!((breakdown.final_score - 0.81).abs() < 1e-9);
    }

    #[test]
    fn test_time_decay_grows_with_age() {
        let m = model(&[("ai_confidence", 1.0)], &[("time_decay", -0.3)]);
        let fresh = compute_confidence(&m, &inputs());

        let mut stale = inputs();
        stale.latest_evidence_time = parse_datetime("2026-01-06T12:00:00Z").unwrap();
        let aged = compute_confidence(&m, &stale);

        assert!(aged.final_score < fresh.final_score);
        // After four half-lives the decay fraction is 1 - 1/16.
        let expected = 0.91 - 0.3 * (1.0 - 0.5f64.powi(4));
        assert!((aged.final_score - quantize(expected).unwrap()).abs() < 1e-9);
    }

    #[test]
    fn test_clamped_to_unit_interval() {
        let m = model(&[("ai_confidence", 2.0)], &[]);
        let breakdown = compute_confidence(&m, &inputs());
        assert!((breakdown.final_score - 1.0).abs() < f64::EPSILON);
        assert!(breakdown.raw_score > 1.0);

        let negative = model(&[("ai_confidence", 1.0)], &[("contradiction_penalty", -5.0)]);
        let mut contradicted = inputs();
        contradicted.contradiction = true;
        let low = compute_confidence(&negative, &contradicted);
        assert!((low.final_score).abs() < f64::EPSILON);
    }

    #[test]
    fn test_quantized_to_six_decimals() {
        let m = model(&[("ai_confidence", 1.0 / 3.0)], &[]);
        let breakdown = compute_confidence(&m, &inputs());
        let requantized = quantize(breakdown.final_score).unwrap();
        assert!((breakdown.final_score - requantized).abs() < f64::EPSILON);
    }

    #[test]
    fn test_confidence_level_labels() {
        let m = model(&[], &[]);
        let empty_map: BTreeMap<String, f64> = BTreeMap::new();
        assert_eq!(m.modifiers, empty_map);
        assert_eq!(confidence_level(0.9, &m), "high");
        assert_eq!(confidence_level(0.6, &m), "medium");
        assert_eq!(confidence_level(0.2, &m), "low");
    }
}
