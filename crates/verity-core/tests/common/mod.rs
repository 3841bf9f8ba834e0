//! Shared fixtures for the integration suites.
#![allow(dead_code)]

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use verity_core::primitives::{
    AgentTrust, ClaimType, ConsensusModelConfig, ContextModifiers, DerivationConfig, Domain,
    EvidenceRef, FieldStrategy, GeoPoint, Observation, ReporterContext, RiskProfile,
    StandingClass, TruthKeyConfig, TrustSnapshot,
};
use verity_core::signing::HmacSigner;
use verity_core::temporal::parse_datetime;

pub const FLOOD_KEY: &str = "earth:flood:h3:88283082b9fffff:surface:2026-01-07T11:00Z";

pub fn t(s: &str) -> DateTime<Utc> {
    parse_datetime(s).unwrap()
}

pub fn signer() -> HmacSigner {
    HmacSigner::new(b"integration-test-key", "itest-key-1")
}

/// The hourly `earth.flood.v1` monitor-lane contract: H3 res 8, PT1H
/// bucket, finalize threshold 15, AI auto-verify at 0.82.
pub fn flood_contract() -> ClaimType {
    ClaimType {
        id: "earth.flood.v1".into(),
        version: 1,
        domain: Domain::Earth,
        topic: "flood".into(),
        risk_profile: RiskProfile::Monitor,
        truthkey: TruthKeyConfig::default(),
        consensus_model: ConsensusModelConfig::default(),
        autovalidation: Default::default(),
        temporal_decay: Default::default(),
        evidence: Default::default(),
        confidence_model: Default::default(),
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

/// The critical-lane `ocean.vessel_detection.v1` contract.
pub fn vessel_contract() -> ClaimType {
    let mut contract = flood_contract();
    contract.id = "ocean.vessel_detection.v1".into();
    contract.domain = Domain::Ocean;
    contract.topic = "vessel_detection".into();
    contract.risk_profile = RiskProfile::Critical;
    contract.derivation = DerivationConfig {
        fields: BTreeMap::from([("severity".to_string(), FieldStrategy::Majority)]),
        source_fields: BTreeMap::new(),
    };
    contract.output_schema = Some(json!({
        "type": "object",
        "properties": {
            "severity": {"type": "string"},
            "observation_count": {"type": "integer", "minimum": 1},
            "network_trust": {"type": "number"},
        },
        "required": ["observation_count"],
    }));
    contract
}

pub fn observation(
    id: &str,
    claim_type: &str,
    reporter: &str,
    class: StandingClass,
    payload: &[(&str, Value)],
    reported_at: &str,
) -> Observation {
    Observation {
        observation_id: id.into(),
        probe_id: None,
        claim_type: claim_type.into(),
        reported_at: t(reported_at),
        reporter_id: reporter.into(),
        reporter_context: ReporterContext {
            standing_class: class,
            trust_score: 0.7,
            source_type: "human".into(),
        },
        geo: Some(GeoPoint { lat: 51.507_351, lon: -0.127_758 }),
        location: None,
        payload: payload
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect(),
        evidence_refs: vec![EvidenceRef::from_content(id.as_bytes(), format!("s3://evidence/{id}"))],
    }
}

pub fn trust_snapshot(
    snapshot_id: &str,
    snapshot_time: &str,
    entries: &[(&str, f64, f64, &str)],
) -> TrustSnapshot {
    let trusts: BTreeMap<String, AgentTrust> = entries
        .iter()
        .map(|(id, power, standing, class)| {
            (
                (*id).to_string(),
                AgentTrust {
                    agent_id: (*id).to_string(),
                    effective_power: *power,
                    standing: *standing,
                    derived_class: (*class).to_string(),
                    flags: vec![],
                    context_modifiers: ContextModifiers {
                        domain_affinity: 1.0,
                        network_position: 1.0,
                        recent_activity: 1.0,
                        abuse_flags: vec![],
                    },
                },
            )
        })
        .collect();
    TrustSnapshot::create(snapshot_id, t(snapshot_time), trusts).unwrap()
}
