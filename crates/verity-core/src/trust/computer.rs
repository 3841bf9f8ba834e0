//! Contextual effective trust and snapshot assembly.
//!
//! Standing is global; trust is local. The computer projects each agent's
//! standing into a context `(claim_type, snapshot_time)` by applying:
//!
//! - **domain affinity**: correct/total outcome ratio in the snapshot's
//!   claim type (1.0 with no history);
//! - **network position**: a bounded bonus (≤ 1.1×) from inbound vouches of
//!   high-standing agents within three hops, multiplied by the isolation
//!   penalty `(1 − I)` with grounding attenuation;
//! - **recent activity**: a multiplier in `[0.9, 1.1]`.
//!
//! `effective_power = phase_weight(standing) × Π modifiers`, quantized to
//! six decimals inside the snapshot's canonical projection. Effective trust
//! is computed fresh for every snapshot and never stored.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::canonical::{CanonicalError, quantize};
use crate::primitives::{AgentTrust, ContextModifiers, TrustSnapshot};

use super::network::AgentGraph;
use super::policy::TrustPolicy;
use super::reducer::{ReducerError, ReducerState, TrustReducer};
use super::signal::Signal;

/// The context a snapshot is computed for.
#[derive(Debug, Clone, Default)]
pub struct TrustContext {
    /// Claim type scoping domain affinity; `None` disables it.
    pub claim_type_id: Option<String>,
    /// The instant the snapshot freezes. Signals after it are invisible.
    pub snapshot_time: DateTime<Utc>,
}

/// Errors from trust computation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TrustError {
    /// Replay failed.
    #[error(transparent)]
    Reducer(#[from] ReducerError),

    /// The snapshot projection could not be hashed.
    #[error("snapshot canonicalization failed: {0}")]
    Canonical(#[from] CanonicalError),
}

/// Computes effective trust and assembles frozen snapshots.
pub struct TrustComputer<'p> {
    policy: &'p TrustPolicy,
}

impl<'p> TrustComputer<'p> {
    /// Creates a computer over a policy.
    #[must_use]
    pub const fn new(policy: &'p TrustPolicy) -> Self {
        Self { policy }
    }

    /// Builds a frozen trust snapshot for the given agents in a context.
    ///
    /// The snapshot is deterministic for a given `(signals ≤ snapshot_time,
    /// policy, agent_ids)` regardless of concurrent later signals.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError`] when replay fails or the projection cannot be
    /// hashed.
    pub fn snapshot(
        &self,
        snapshot_id: &str,
        signals: &[Signal],
        agent_ids: &[String],
        context: &TrustContext,
    ) -> Result<TrustSnapshot, TrustError> {
        let reducer = TrustReducer::new(self.policy);
        let state = reducer.reduce(signals, context.snapshot_time, None)?;
        let graph = AgentGraph::from_signals(signals, context.snapshot_time);
        let standings = state.standings_at(context.snapshot_time, self.policy);

        let mut agent_trusts = BTreeMap::new();
        for agent_id in agent_ids {
            let trust = self.compute_agent_trust(agent_id, &state, &graph, &standings, context);
            agent_trusts.insert(agent_id.clone(), trust);
        }

        let snapshot =
            TrustSnapshot::create(snapshot_id, context.snapshot_time, agent_trusts)?;
        tracing::debug!(
            snapshot_id,
            agents = snapshot.agent_trusts.len(),
            hash = %snapshot.snapshot_hash,
            "trust snapshot frozen"
        );
        Ok(snapshot)
    }

    fn compute_agent_trust(
        &self,
        agent_id: &str,
        state: &ReducerState,
        graph: &AgentGraph,
        standings: &BTreeMap<String, f64>,
        context: &TrustContext,
    ) -> AgentTrust {
        let standing = state.standing_at(agent_id, context.snapshot_time, self.policy);
        let mut flags = Vec::new();
        let mut abuse_flags = Vec::new();

        let domain_affinity = self.domain_affinity(agent_id, state, context);

        // Network position: bounded vouch bonus times the isolation
        // penalty.
        let vouch_weight = graph.inbound_vouch_weight(
            agent_id,
            standings,
            self.policy.network.max_depth,
            self.policy.network.hop_decay,
        );
        let vouch_bonus = (1.0 + self.policy.network.bonus_scale * vouch_weight)
            .min(self.policy.network.max_position);

        let isolation_factor = if self.policy.isolation.enabled {
            let index = graph.isolation_profile(agent_id).index();
            let grounded = graph.has_grounding_with(agent_id, |counterpart| {
                let counterpart_standing = standings.get(counterpart).copied().unwrap_or(0.0);
                self.policy.class_for(counterpart_standing) == "authority"
                    || state
                        .agents
                        .get(counterpart)
                        .is_some_and(|a| a.role == "sensor" || a.role == "authority")
            });
            let effective_index = if grounded {
                index * (1.0 - self.policy.isolation.grounding_relief)
            } else {
                index
            };
            if index >= self.policy.isolation.flag_threshold {
                flags.push("ISOLATED".to_string());
                abuse_flags.push("ISOLATED".to_string());
            }
            1.0 - effective_index
        } else {
            1.0
        };

        if state.agents.get(agent_id).is_some_and(|a| a.isolation_flagged) {
            flags.push("ISOLATION_FLAG".to_string());
            abuse_flags.push("ISOLATION_FLAG".to_string());
        }

        let network_position = vouch_bonus * isolation_factor;
        let recent_activity = self.activity_multiplier(agent_id, state, context.snapshot_time);

        let raw = self.policy.phase_weight(standing);
        let effective_power =
            raw * domain_affinity * network_position * recent_activity;

        flags.sort();
        flags.dedup();
        abuse_flags.sort();
        abuse_flags.dedup();

        AgentTrust {
            agent_id: agent_id.to_string(),
            effective_power: quantize(effective_power).unwrap_or(0.0),
            standing: quantize(standing).unwrap_or(0.0),
            derived_class: self.policy.class_for(standing).to_string(),
            flags,
            context_modifiers: ContextModifiers {
                domain_affinity: quantize(domain_affinity).unwrap_or(0.0),
                network_position: quantize(network_position).unwrap_or(0.0),
                recent_activity: quantize(recent_activity).unwrap_or(0.0),
                abuse_flags,
            },
        }
    }

    /// Correct/total ratio in the context's claim type; 1.0 when the agent
    /// has no history there or no claim type scopes the snapshot.
    fn domain_affinity(
        &self,
        agent_id: &str,
        state: &ReducerState,
        context: &TrustContext,
    ) -> f64 {
        let Some(claim_type) = &context.claim_type_id else {
            return 1.0;
        };
        state
            .agents
            .get(agent_id)
            .and_then(|a| a.outcomes.get(&claim_type.to_lowercase()))
            .filter(|tally| tally.total > 0)
            .map_or(1.0, |tally| f64::from(tally.correct) / f64::from(tally.total))
    }

    /// Activity multiplier in `[min, max]`: `max` within half the window,
    /// 1.0 within the window, `min` beyond it or with no recorded activity
    /// older than the window.
    fn activity_multiplier(
        &self,
        agent_id: &str,
        state: &ReducerState,
        as_of: DateTime<Utc>,
    ) -> f64 {
        let Some(last) = state.agents.get(agent_id).and_then(|a| a.last_activity) else {
            return 1.0;
        };
        let elapsed = (as_of - last).num_seconds().max(0);
        let window = self.policy.activity.window.total_seconds();
        if elapsed * 2 <= window {
            self.policy.activity.max_multiplier
        } else if elapsed <= window {
            1.0
        } else {
            self.policy.activity.min_multiplier
        }
    }
}
