//! Frozen trust snapshots consumed by the truth compiler.
//!
//! A snapshot is the interface between the trust engine and the compiler:
//! the trust engine assembles it, the compiler treats it as immutable input.
//! The snapshot hash is computed over a canonical projection — floats
//! quantized to six decimals, flags sorted, classes lowercased, entries
//! sorted by agent id — so identical trust data always yields an identical
//! hash.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::canonical::{CanonicalError, canonical_hash, quantize};

/// Context-local modifiers applied on top of global standing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ContextModifiers {
    /// Ratio of correct outcomes in the snapshot's claim type to total
    /// outcomes in that type; 1.0 for agents with no history.
    pub domain_affinity: f64,
    /// Network position multiplier, at most 1.1.
    pub network_position: f64,
    /// Recent activity multiplier in `[0.9, 1.1]`.
    pub recent_activity: f64,
    /// Abuse flags raised during computation, sorted.
    #[serde(default)]
    pub abuse_flags: Vec<String>,
}

impl ContextModifiers {
    fn canonical(&self) -> Value {
        let mut flags: Vec<String> = self.abuse_flags.clone();
        flags.sort();
        json!({
            "domain_affinity": quantize(self.domain_affinity).unwrap_or(0.0),
            "network_position": quantize(self.network_position).unwrap_or(0.0),
            "recent_activity": quantize(self.recent_activity).unwrap_or(0.0),
            "abuse_flags": flags,
        })
    }
}

/// Trust data for a single agent at snapshot time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTrust {
    /// The agent this entry describes.
    pub agent_id: String,
    /// Context-local effective power, quantized to six decimals.
    pub effective_power: f64,
    /// Global standing in `[0, 1000]`.
    pub standing: f64,
    /// Standing class derived from policy thresholds.
    pub derived_class: String,
    /// Flags raised for this agent, e.g. `ISOLATED`, `SELF_DEALING`.
    #[serde(default)]
    pub flags: Vec<String>,
    /// The modifiers that produced `effective_power`.
    #[serde(default)]
    pub context_modifiers: ContextModifiers,
}

impl AgentTrust {
    /// The canonical projection used for the snapshot hash.
    #[must_use]
    pub fn canonical(&self) -> Value {
        let mut flags: Vec<String> = self.flags.clone();
        flags.sort();
        json!({
            "agent_id": self.agent_id,
            "effective_power": quantize(self.effective_power).unwrap_or(0.0),
            "standing": quantize(self.standing).unwrap_or(0.0),
            "derived_class": self.derived_class.to_lowercase(),
            "flags": flags,
            "context_modifiers": self.context_modifiers.canonical(),
        })
    }
}

/// A frozen, hash-identified map of effective trust.
///
/// Immutable after construction; the compiler verifies `snapshot_hash`
/// before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustSnapshot {
    /// Caller-provided stable snapshot id.
    pub snapshot_id: String,
    /// When the snapshot was taken (UTC).
    pub snapshot_time: DateTime<Utc>,
    /// Agent id to trust entry.
    pub agent_trusts: BTreeMap<String, AgentTrust>,
    /// SHA-256 over the canonical projection of `agent_trusts`.
    pub snapshot_hash: String,
}

impl TrustSnapshot {
    /// Creates a snapshot with its hash computed.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError`] if the projection cannot be
    /// canonicalized.
    pub fn create(
        snapshot_id: impl Into<String>,
        snapshot_time: DateTime<Utc>,
        agent_trusts: BTreeMap<String, AgentTrust>,
    ) -> Result<Self, CanonicalError> {
        let mut snapshot = Self {
            snapshot_id: snapshot_id.into(),
            snapshot_time,
            agent_trusts,
            snapshot_hash: String::new(),
        };
        snapshot.snapshot_hash = snapshot.compute_hash()?;
        Ok(snapshot)
    }

    /// The canonical projection of all agent entries, sorted by agent id.
    #[must_use]
    pub fn canonical_trusts(&self) -> Value {
        // BTreeMap iteration is already sorted by agent id.
        let entries: Map<String, Value> = self
            .agent_trusts
            .iter()
            .map(|(id, trust)| (id.clone(), trust.canonical()))
            .collect();
        Value::Object(entries)
    }

    /// Computes the deterministic hash of the trust data.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError`] if the projection cannot be
    /// canonicalized.
    pub fn compute_hash(&self) -> Result<String, CanonicalError> {
        canonical_hash(&self.canonical_trusts())
    }

    /// Verifies that the stored hash matches the computed hash.
    #[must_use]
    pub fn verify_hash(&self) -> bool {
        self.compute_hash()
            .is_ok_and(|computed| computed == self.snapshot_hash)
    }

    /// Trust entry for an agent, when present.
    #[must_use]
    pub fn agent_trust(&self, agent_id: &str) -> Option<&AgentTrust> {
        self.agent_trusts.get(agent_id)
    }

    /// Effective power for an agent; zero for agents outside the snapshot.
    #[must_use]
    pub fn effective_power(&self, agent_id: &str) -> f64 {
        self.agent_trusts
            .get(agent_id)
            .map_or(0.0, |t| t.effective_power)
    }

    /// Standing for an agent; zero for agents outside the snapshot.
    #[must_use]
    pub fn standing(&self, agent_id: &str) -> f64 {
        self.agent_trusts.get(agent_id).map_or(0.0, |t| t.standing)
    }
}
