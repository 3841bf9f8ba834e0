//! Deterministic claim payload derivation.
//!
//! `TruthState.claim` is always derived from observations under the
//! contract's per-field strategies; the compiler never accepts an
//! externally supplied claim payload. Weights come from effective power in
//! the trust snapshot.
//!
//! Strategies:
//!
//! - **weighted_median**: continuous weighted median of numeric values —
//!   cumulative-midpoint interpolation at half the total weight. Degenerates
//!   to the plain value for a single observation and is robust to outliers
//!   for many.
//! - **majority**: the value with the greatest accumulated weight; ties
//!   break toward the smaller canonical bytes.
//! - **evidence_union**: the count of distinct evidence identities across
//!   all observations.
//!
//! Every derived payload also carries `observation_count` and
//! `network_trust` aggregates.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Value, json};
use thiserror::Error;

use crate::canonical::canonical_string;
use crate::primitives::{ClaimType, FieldStrategy, Observation, TrustSnapshot};

/// Decimal places for derived numeric fields.
const FIELD_PRECISION: i32 = 2;

/// Errors during claim derivation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DerivationError {
    /// Derivation requires at least one observation.
    #[error("cannot derive claim from empty observations")]
    EmptyObservations,
}

/// Derives the claim payload from observations under a contract.
///
/// # Errors
///
/// Returns [`DerivationError::EmptyObservations`] when no observations are
/// provided.
pub fn derive_claim_payload(
    observations: &[Observation],
    snapshot: &TrustSnapshot,
    claim_type: &ClaimType,
) -> Result<BTreeMap<String, Value>, DerivationError> {
    if observations.is_empty() {
        return Err(DerivationError::EmptyObservations);
    }

    let weights: Vec<f64> = observations
        .iter()
        .map(|obs| snapshot.effective_power(&obs.reporter_id))
        .collect();
    let total_power: f64 = weights.iter().sum();

    let mut claim = BTreeMap::new();

    for (field, strategy) in &claim_type.derivation.fields {
        let source = claim_type
            .derivation
            .source_fields
            .get(field)
            .map_or(field.as_str(), String::as_str);
        let derived = match strategy {
            FieldStrategy::WeightedMedian => {
                derive_weighted_median(observations, &weights, source)
            },
            FieldStrategy::Majority => derive_majority(observations, &weights, source),
            FieldStrategy::EvidenceUnion => Some(json!(distinct_evidence(observations))),
        };
        if let Some(value) = derived {
            claim.insert(field.clone(), value);
        }
    }

    claim.insert("observation_count".into(), json!(observations.len()));
    claim.insert(
        "network_trust".into(),
        json!(round_to(total_power, FIELD_PRECISION)),
    );

    Ok(claim)
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round_ties_even() / scale
}

/// Continuous weighted median: sort by value, place each value's weight at
/// its cumulative midpoint, and interpolate at half the total weight.
fn derive_weighted_median(
    observations: &[Observation],
    weights: &[f64],
    source: &str,
) -> Option<Value> {
    let mut pairs: Vec<(f64, f64)> = observations
        .iter()
        .zip(weights)
        .filter_map(|(obs, &w)| {
            let value = obs.payload.get(source)?.as_f64()?;
            (w > 0.0).then_some((value, w))
        })
        .collect();
    if pairs.is_empty() {
        return None;
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let total: f64 = pairs.iter().map(|(_, w)| w).sum();
    let target = total / 2.0;

    // Cumulative midpoints of each weight block.
    let mut midpoints = Vec::with_capacity(pairs.len());
    let mut running = 0.0;
    for (_, w) in &pairs {
        midpoints.push(running + w / 2.0);
        running += w;
    }

    let median = if target <= midpoints[0] {
        pairs[0].0
    } else if target >= *midpoints.last().unwrap_or(&0.0) {
        pairs[pairs.len() - 1].0
    } else {
        let mut result = pairs[pairs.len() - 1].0;
        for i in 1..pairs.len() {
            if target <= midpoints[i] {
                let t = (target - midpoints[i - 1]) / (midpoints[i] - midpoints[i - 1]);
                result = pairs[i - 1].0 + t * (pairs[i].0 - pairs[i - 1].0);
                break;
            }
        }
        result
    };

    Some(json!(round_to(median, FIELD_PRECISION)))
}

/// Majority by accumulated weight; ties break toward the smaller canonical
/// bytes of the candidate value.
fn derive_majority(observations: &[Observation], weights: &[f64], source: &str) -> Option<Value> {
    // Keyed by canonical bytes so accumulation and tie-breaking share one
    // deterministic ordering.
    let mut tally: BTreeMap<String, (Value, f64)> = BTreeMap::new();
    for (obs, &w) in observations.iter().zip(weights) {
        let Some(value) = obs.payload.get(source) else {
            continue;
        };
        let Ok(key) = canonical_string(value) else {
            continue;
        };
        tally
            .entry(key)
            .and_modify(|(_, acc)| *acc += w)
            .or_insert_with(|| (value.clone(), w));
    }

    // BTreeMap iteration is ascending by canonical bytes, so with a strict
    // comparison the first maximal entry wins ties.
    let mut best: Option<(&Value, f64)> = None;
    for (value, weight) in tally.values() {
        if best.map_or(true, |(_, w)| *weight > w) {
            best = Some((value, *weight));
        }
    }
    best.map(|(value, _)| value.clone())
}

fn distinct_evidence(observations: &[Observation]) -> usize {
    let identities: BTreeSet<String> = observations
        .iter()
        .flat_map(|obs| obs.evidence_refs.iter())
        .map(|e| e.sha256.to_lowercase())
        .collect();
    identities.len()
}
