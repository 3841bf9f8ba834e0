//! The trust engine.
//!
//! An event-sourced reducer computes agent *standing* (a global scalar in
//! `[0, 1000]`) from an immutable signal log under a versioned policy; a
//! trust computer derives context-local *effective trust* and emits frozen
//! [`TrustSnapshot`](crate::primitives::TrustSnapshot)s for the compiler.
//!
//! Standing and trust edges are never persisted as ground truth: they are
//! projections of the signal log and are rebuildable at any `as_of_time`
//! under any policy version. Replaying the same log under the same policy
//! reproduces the same snapshot hash, byte for byte.
//!
//! # Example
//!
//! ```
//! use verity_core::trust::{
//!     MemorySignalStore, Signal, TrustContext, TrustEngine, TrustPolicy,
//! };
//! use verity_core::temporal::parse_datetime;
//!
//! let mut engine =
//!     TrustEngine::new(MemorySignalStore::new(), TrustPolicy::default()).unwrap();
//! let t = parse_datetime("2026-01-07T10:00:00Z").unwrap();
//! engine
//!     .append_signal(Signal::agent_registered("agent:a", "observer", t, "policy:verity_v1.0.0"))
//!     .unwrap();
//! let standing = engine.get_standing("agent:a", t).unwrap();
//! assert!(standing > 0.0);
//! ```

mod computer;
mod network;
mod policy;
mod reducer;
mod signal;
mod store;

pub use computer::{TrustComputer, TrustContext, TrustError};
pub use network::{AgentGraph, EdgeType, IsolationProfile};
pub use policy::{
    ActivityConfig, BoundsConfig, ClassThresholds, DecayConfig, IsolationConfig, LintReport,
    NetworkConfig, Phase, PhaseConfig, PolicyError, TelemetryConfig, TrustPolicy,
    UpdateCoefficients,
};
pub use reducer::{AgentState, ReducerError, ReducerState, TrustReducer};
pub use signal::{Signal, SignalContext, SignalType, ValidationWindow, VoteChoiceSignal};
pub use store::{JsonlSignalStore, MemorySignalStore, SignalStore, StoreError};

use chrono::{DateTime, Utc};

use crate::primitives::TrustSnapshot;

/// Facade owning a signal store and a policy, exposing the public trust
/// operations.
///
/// Writers serialize on [`append_signal`](Self::append_signal); readers see
/// a consistent prefix determined by their `as_of` argument. The engine
/// itself never reads a wall clock — every operation takes explicit time.
pub struct TrustEngine<S: SignalStore> {
    store: S,
    policy: TrustPolicy,
}

impl<S: SignalStore> TrustEngine<S> {
    /// Creates an engine, linting the policy first.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] when the policy fails the archetype linter;
    /// an unlinted policy is never activated.
    pub fn new(store: S, policy: TrustPolicy) -> Result<Self, PolicyError> {
        let report = policy.lint()?;
        tracing::debug!(
            policy_version = %policy.version,
            honest_delta = report.honest_delta,
            "policy lint passed"
        );
        Ok(Self { store, policy })
    }

    /// The active policy.
    #[must_use]
    pub const fn policy(&self) -> &TrustPolicy {
        &self.policy
    }

    /// Read access to the signal store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Appends a signal to the log.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on id conflicts or integrity failures; the
    /// caller can retry with an adjusted `time` or id.
    pub fn append_signal(&mut self, signal: Signal) -> Result<(), StoreError> {
        self.store.append(signal)
    }

    /// Standing for an agent at `as_of`, with lazy decay applied.
    ///
    /// # Errors
    ///
    /// Returns [`ReducerError`] when replay exceeds its bound.
    pub fn get_standing(&self, agent_id: &str, as_of: DateTime<Utc>) -> Result<f64, ReducerError> {
        let reducer = TrustReducer::new(&self.policy);
        let state = reducer.reduce(&self.store.get_all(), as_of, None)?;
        Ok(state.standing_at(agent_id, as_of, &self.policy))
    }

    /// Builds a frozen trust snapshot for a context.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError`] when replay fails or the snapshot cannot be
    /// hashed.
    pub fn get_trust_snapshot(
        &self,
        snapshot_id: &str,
        agent_ids: &[String],
        context: &TrustContext,
    ) -> Result<TrustSnapshot, TrustError> {
        let computer = TrustComputer::new(&self.policy);
        computer.snapshot(snapshot_id, &self.store.get_all(), agent_ids, context)
    }
}
