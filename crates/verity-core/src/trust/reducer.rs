//! Event-sourced standing computation.
//!
//! The reducer is a pure function `(signals, policy, as_of_time) →
//! standings`. Signals are replayed in canonical `(time, signal_id)` order
//! up to `as_of_time`; the same log under the same policy always reproduces
//! the same state. Decay is applied lazily at query time, never during
//! replay.
//!
//! Unknown signal types are no-ops but are counted, so a future policy can
//! reinterpret history without the log having lied about what it held.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use super::policy::TrustPolicy;
use super::signal::{Signal, SignalType};

/// Errors from reducer replay.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReducerError {
    /// Replay would exceed the caller's signal bound.
    #[error("replay bound exceeded: {count} signals, limit {limit}")]
    ReplayBoundExceeded {
        /// Signals that matched the replay window.
        count: usize,
        /// The caller's limit.
        limit: usize,
    },
}

impl ReducerError {
    /// Stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ReplayBoundExceeded { .. } => "signal_store_exhausted",
        }
    }
}

/// Correct/total outcome tally for one claim type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutcomeTally {
    /// Outcomes attributed as correct.
    pub correct: u32,
    /// All attributed outcomes.
    pub total: u32,
}

/// Derived per-agent state. Never persisted as source of truth.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentState {
    /// Standing before lazy decay.
    pub standing: f64,
    /// Role the agent registered with.
    pub role: String,
    /// Time of the agent's most recent signal.
    pub last_activity: Option<DateTime<Utc>>,
    /// Outcome tallies per claim type, feeding domain affinity.
    pub outcomes: BTreeMap<String, OutcomeTally>,
    /// Whether an `ISOLATION_FLAG` signal targeted this agent.
    pub isolation_flagged: bool,
}

#[derive(Debug, Clone)]
struct PendingVote {
    voter_id: String,
    choice: String,
    confidence: Option<f64>,
    claim_type: Option<String>,
}

/// The state a replay produces.
#[derive(Debug, Clone, Default)]
pub struct ReducerState {
    /// Per-agent derived state.
    pub agents: BTreeMap<String, AgentState>,
    /// Votes awaiting their parent `TRUTH_VERIFIED`.
    pending_votes: BTreeMap<String, Vec<PendingVote>>,
    /// Unknown signal types encountered (no-ops, but recorded).
    pub unknown_signals: u32,
}

impl ReducerState {
    /// Standing for an agent at `as_of`, with lazy decay toward the
    /// role-initial standing.
    #[must_use]
    pub fn standing_at(&self, agent_id: &str, as_of: DateTime<Utc>, policy: &TrustPolicy) -> f64 {
        self.agents.get(agent_id).map_or_else(
            || policy.initial_standing("observer"),
            |agent| {
                let initial = policy.initial_standing(&agent.role);
                let elapsed = agent
                    .last_activity
                    .map_or(0, |last| (as_of - last).num_seconds());
                policy.decay_standing(agent.standing, initial, elapsed)
            },
        )
    }

    /// All standings at `as_of`, decayed.
    #[must_use]
    pub fn standings_at(
        &self,
        as_of: DateTime<Utc>,
        policy: &TrustPolicy,
    ) -> BTreeMap<String, f64> {
        self.agents
            .keys()
            .map(|id| (id.clone(), self.standing_at(id, as_of, policy)))
            .collect()
    }

    fn ensure_agent(&mut self, agent_id: &str, role: &str, policy: &TrustPolicy) -> &mut AgentState {
        self.agents
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentState {
                standing: policy.initial_standing(role),
                role: role.to_string(),
                last_activity: None,
                outcomes: BTreeMap::new(),
                isolation_flagged: false,
            })
    }
}

/// The deterministic reducer.
pub struct TrustReducer<'p> {
    policy: &'p TrustPolicy,
}

impl<'p> TrustReducer<'p> {
    /// Creates a reducer over a policy.
    #[must_use]
    pub const fn new(policy: &'p TrustPolicy) -> Self {
        Self { policy }
    }

    /// Replays signals up to `as_of`, optionally bounded by a maximum
    /// signal count.
    ///
    /// # Errors
    ///
    /// Returns [`ReducerError::ReplayBoundExceeded`] instead of a partial
    /// result when `max_signals` is exceeded.
    pub fn reduce(
        &self,
        signals: &[Signal],
        as_of: DateTime<Utc>,
        max_signals: Option<usize>,
    ) -> Result<ReducerState, ReducerError> {
        let mut window: Vec<&Signal> = signals.iter().filter(|s| s.time <= as_of).collect();
        window.sort_by(|a, b| (a.time, &a.signal_id).cmp(&(b.time, &b.signal_id)));

        if let Some(limit) = max_signals {
            if window.len() > limit {
                return Err(ReducerError::ReplayBoundExceeded {
                    count: window.len(),
                    limit,
                });
            }
        }

        let mut state = ReducerState::default();
        for signal in window {
            self.apply(&mut state, signal);
        }
        tracing::trace!(agents = state.agents.len(), "replay complete");
        Ok(state)
    }

    fn apply(&self, state: &mut ReducerState, signal: &Signal) {
        match &signal.signal_type {
            SignalType::AgentRegistered => {
                let role = signal
                    .payload
                    .get("role")
                    .and_then(Value::as_str)
                    .unwrap_or("observer");
                let agent = state.ensure_agent(&signal.object_id, role, self.policy);
                agent.last_activity = Some(signal.time);
            },
            SignalType::PolicyRegistered => {
                let agent = state.ensure_agent(&signal.object_id, "policy", self.policy);
                agent.last_activity = Some(signal.time);
            },
            SignalType::ObservationSubmitted => {
                let agent = state.ensure_agent(&signal.agent_id, "observer", self.policy);
                agent.last_activity = Some(signal.time);
            },
            SignalType::ValidationVote => {
                let agent = state.ensure_agent(&signal.agent_id, "validator", self.policy);
                agent.last_activity = Some(signal.time);
                state
                    .pending_votes
                    .entry(signal.object_id.clone())
                    .or_default()
                    .push(PendingVote {
                        voter_id: signal.agent_id.clone(),
                        choice: signal
                            .payload
                            .get("choice")
                            .and_then(Value::as_str)
                            .unwrap_or("ABSTAIN")
                            .to_string(),
                        confidence: signal.payload.get("confidence").and_then(Value::as_f64),
                        claim_type: signal
                            .context
                            .as_ref()
                            .and_then(|c| c.claim_type_id.clone()),
                    });
            },
            SignalType::TruthVerified => self.apply_truth_verified(state, signal),
            SignalType::Vouch | SignalType::MemberOf => {
                // Edges are read by the trust computer at query time; here
                // they only count as activity.
                state
                    .ensure_agent(&signal.agent_id, "observer", self.policy)
                    .last_activity = Some(signal.time);
                state
                    .ensure_agent(&signal.object_id, "observer", self.policy)
                    .last_activity = Some(signal.time);
            },
            SignalType::IsolationFlag => {
                state
                    .ensure_agent(&signal.object_id, "observer", self.policy)
                    .isolation_flagged = true;
            },
            SignalType::WindowOpened
            | SignalType::WindowClosed
            | SignalType::WindowExtended
            | SignalType::WindowAborted => {},
            SignalType::Unknown(_) => {
                state.unknown_signals += 1;
            },
        }
    }

    fn apply_truth_verified(&self, state: &mut ReducerState, signal: &Signal) {
        let status = signal
            .payload
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("");
        let outcome = signal
            .payload
            .get("outcome")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let accuracy = signal
            .payload
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(1.0)
            .clamp(0.0, 1.0);
        let magnitude = signal
            .payload
            .get("magnitude")
            .and_then(Value::as_f64)
            .unwrap_or(1.0);
        let claim_type = signal
            .context
            .as_ref()
            .and_then(|c| c.claim_type_id.clone());

        let contributors: Vec<String> = signal
            .payload
            .get("contributors")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        // Outcome attribution: Δ = outcome × magnitude × accuracy.
        let update = &self.policy.update;
        let delta = match outcome {
            "correct" => update.observation_correct * magnitude * accuracy,
            "incorrect" => -update.observation_wrong * magnitude * accuracy,
            _ => 0.0,
        };
        for contributor in &contributors {
            let agent = state.ensure_agent(contributor, "observer", self.policy);
            if delta != 0.0 {
                agent.standing = self.policy.apply_delta(agent.standing, delta);
            }
            agent.last_activity = Some(signal.time);
            let tally = agent.outcomes.entry(tally_key(claim_type.as_deref())).or_default();
            tally.total += 1;
            if outcome == "correct" {
                tally.correct += 1;
            }
        }

        // Settle votes that were waiting on this outcome.
        let Some(votes) = state.pending_votes.remove(&signal.object_id) else {
            return;
        };
        for vote in votes {
            let aligned = matches!(
                (vote.choice.as_str(), status),
                ("RATIFY", "VERIFIED_TRUE") | ("REJECT", "VERIFIED_FALSE")
            );
            let abstained = vote.choice == "ABSTAIN";
            let confidence = vote.confidence.unwrap_or(0.5);

            let delta = if abstained {
                0.0
            } else if aligned {
                let mut gain = update.vote_correct * accuracy;
                if confidence <= update.calibrated_threshold {
                    gain += update.calibrated_confidence;
                }
                gain
            } else {
                let mut penalty = update.vote_wrong * accuracy;
                if confidence >= update.reckless_threshold {
                    penalty *= update.reckless_confidence;
                }
                -penalty
            };

            let voter = state.ensure_agent(&vote.voter_id, "validator", self.policy);
            if delta != 0.0 {
                voter.standing = self.policy.apply_delta(voter.standing, delta);
            }
            voter.last_activity = Some(signal.time);
            if !abstained {
                let tally = voter
                    .outcomes
                    .entry(tally_key(vote.claim_type.as_deref().or(claim_type.as_deref())))
                    .or_default();
                tally.total += 1;
                if aligned {
                    tally.correct += 1;
                }
            }
        }
    }
}

fn tally_key(claim_type: Option<&str>) -> String {
    claim_type.unwrap_or("unscoped").to_lowercase()
}
