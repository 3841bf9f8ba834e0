//! Observations: raw reports from humans, sensors, and AI validators.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::canonical::{CanonicalError, canonical_hash, quantize};
use crate::temporal::canonical_datetime;

use super::evidence::EvidenceRef;

/// Reporter standing classes, derived from standing by policy thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StandingClass {
    /// Entry tier.
    Bronze,
    /// Established reporters.
    Silver,
    /// Domain experts.
    Expert,
    /// Calibrated sensors and official sources.
    Authority,
}

impl StandingClass {
    /// The lowercase canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bronze => "bronze",
            Self::Silver => "silver",
            Self::Expert => "expert",
            Self::Authority => "authority",
        }
    }
}

/// Context about the reporter at submission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReporterContext {
    /// Standing class at submission.
    pub standing_class: StandingClass,

    /// Numeric trust score in `[0, 1]` at submission.
    pub trust_score: f64,

    /// Origin of the report: `human`, `sensor`, `drone`, `official`, ...
    #[serde(default = "default_source_type")]
    pub source_type: String,
}

fn default_source_type() -> String {
    "human".to_string()
}

impl ReporterContext {
    /// The canonical projection.
    #[must_use]
    pub fn canonical(&self) -> Value {
        json!({
            "source_type": self.source_type.to_lowercase(),
            "standing_class": self.standing_class.as_str(),
            "trust_score": quantize(self.trust_score).unwrap_or(0.0),
        })
    }
}

/// A geospatial point reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

/// A single observation about a physical-world event.
///
/// Observations are immutable after submission; the canonical hash covers
/// every identity-bearing field with the evidence list sorted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Stable observation id.
    pub observation_id: String,

    /// Link to the coordinating probe, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_id: Option<String>,

    /// The claim type this observation reports against, e.g.
    /// `earth.flood.v1`.
    pub claim_type: String,

    /// Event time (UTC; naive input is rejected upstream at parse time).
    pub reported_at: DateTime<Utc>,

    /// The reporting agent.
    pub reporter_id: String,

    /// Reporter context at submission.
    pub reporter_context: ReporterContext,

    /// Geospatial reference, for spatial claims.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<GeoPoint>,

    /// Named location, for claims addressed by identifier rather than
    /// coordinates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// The observed payload.
    #[serde(default)]
    pub payload: BTreeMap<String, Value>,

    /// Evidence backing the observation.
    #[serde(default)]
    pub evidence_refs: Vec<EvidenceRef>,
}

impl Observation {
    /// The canonical projection: evidence sorted by identity, coordinates
    /// and scores quantized, times in canonical UTC form.
    #[must_use]
    pub fn canonical(&self) -> Value {
        let mut evidence: Vec<&EvidenceRef> = self.evidence_refs.iter().collect();
        evidence.sort_by(|a, b| {
            (a.sha256.to_lowercase(), &a.uri).cmp(&(b.sha256.to_lowercase(), &b.uri))
        });

        let mut obj = Map::new();
        obj.insert("observation_id".into(), json!(self.observation_id));
        obj.insert("claim_type".into(), json!(self.claim_type.to_lowercase()));
        obj.insert(
            "reported_at".into(),
            json!(canonical_datetime(self.reported_at)),
        );
        obj.insert("reporter_id".into(), json!(self.reporter_id));
        obj.insert(
            "reporter_context".into(),
            self.reporter_context.canonical(),
        );
        obj.insert(
            "payload".into(),
            Value::Object(self.payload.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        );
        obj.insert(
            "evidence_refs".into(),
            Value::Array(evidence.iter().map(|e| e.canonical()).collect()),
        );
        if let Some(probe_id) = &self.probe_id {
            obj.insert("probe_id".into(), json!(probe_id));
        }
        if let Some(geo) = self.geo {
            obj.insert(
                "geo".into(),
                json!({
                    "lat": quantize(geo.lat).unwrap_or(0.0),
                    "lon": quantize(geo.lon).unwrap_or(0.0),
                }),
            );
        }
        if let Some(location) = &self.location {
            obj.insert("location".into(), json!(location.to_lowercase()));
        }
        Value::Object(obj)
    }

    /// Computes the canonical observation hash.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError`] if the payload cannot be canonicalized.
    pub fn hash(&self) -> Result<String, CanonicalError> {
        canonical_hash(&self.canonical())
    }

    /// The most recent evidence capture time, falling back to
    /// `reported_at` when no evidence carries one.
    #[must_use]
    pub fn latest_evidence_time(&self) -> DateTime<Utc> {
        self.evidence_refs
            .iter()
            .filter_map(|e| e.capture_time)
            .max()
            .unwrap_or(self.reported_at)
    }
}
