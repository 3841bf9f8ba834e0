//! Silver/gold projection of signed truth states.
//!
//! The medallion layout keeps an append-only *silver* history keyed by
//! `(truth_key, compile_time)` and a *gold* latest-state view per truth key,
//! derivable from silver at any time. Exactly one state exists per silver
//! key; the gold entry is the latest by `compile_time` with `state_hash` as
//! the tiebreak.
//!
//! Only signed final states are accepted. Late signals do not mutate
//! history: a recompute at a later `compile_time` appends a new silver row
//! and, when newer, advances gold. Persistence backends live outside the
//! core; this projection is the reference in-memory shape they must match.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::primitives::TruthState;

/// Errors from the truth ledger.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LedgerError {
    /// The state's status is not final.
    #[error("cannot persist intermediate status '{status}' as terminal")]
    NotFinal {
        /// The offending status.
        status: String,
    },

    /// The state carries no signature.
    #[error("cannot persist unsigned state for '{truth_key}'")]
    Unsigned {
        /// The truth key of the unsigned state.
        truth_key: String,
    },

    /// The state's stored hashes do not match its content.
    #[error("state hashes do not verify for '{truth_key}'")]
    HashMismatch {
        /// The truth key of the corrupt state.
        truth_key: String,
    },

    /// A state already exists at this `(truth_key, compile_time)`.
    #[error("duplicate silver entry for ('{truth_key}', {compile_time})")]
    Duplicate {
        /// The truth key.
        truth_key: String,
        /// The compile time already occupied.
        compile_time: DateTime<Utc>,
    },
}

/// In-memory silver/gold projection.
#[derive(Debug, Default)]
pub struct TruthLedger {
    silver: BTreeMap<(String, DateTime<Utc>), TruthState>,
}

impl TruthLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a signed final state to silver.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] for intermediate, unsigned, hash-corrupt, or
    /// duplicate states. Failed appends leave the ledger untouched.
    pub fn append(&mut self, state: TruthState) -> Result<(), LedgerError> {
        if !state.status.is_final() {
            return Err(LedgerError::NotFinal {
                status: state.status.as_str().to_string(),
            });
        }
        if state.security.signature.is_empty() {
            return Err(LedgerError::Unsigned {
                truth_key: state.truth_key.clone(),
            });
        }
        if !state.verify_hashes() {
            return Err(LedgerError::HashMismatch {
                truth_key: state.truth_key.clone(),
            });
        }
        let key = (state.truth_key.clone(), state.compile_inputs.compile_time);
        if self.silver.contains_key(&key) {
            return Err(LedgerError::Duplicate {
                truth_key: key.0,
                compile_time: key.1,
            });
        }
        tracing::debug!(truth_key = %state.truth_key, status = state.status.as_str(), "silver append");
        self.silver.insert(key, state);
        Ok(())
    }

    /// The full silver history for a truth key, ordered by `compile_time`.
    #[must_use]
    pub fn history(&self, truth_key: &str) -> Vec<&TruthState> {
        self.silver
            .range((truth_key.to_string(), DateTime::<Utc>::MIN_UTC)..)
            .take_while(|((key, _), _)| key == truth_key)
            .map(|(_, state)| state)
            .collect()
    }

    /// The gold view: the latest state for a truth key by `compile_time`,
    /// with `state_hash` as the tiebreak.
    #[must_use]
    pub fn latest(&self, truth_key: &str) -> Option<&TruthState> {
        self.history(truth_key).into_iter().max_by(|a, b| {
            a.compile_inputs
                .compile_time
                .cmp(&b.compile_inputs.compile_time)
                .then_with(|| a.security.state_hash.cmp(&b.security.state_hash))
        })
    }

    /// All gold entries: latest state per truth key.
    #[must_use]
    pub fn gold(&self) -> BTreeMap<&str, &TruthState> {
        let mut out: BTreeMap<&str, &TruthState> = BTreeMap::new();
        for ((key, _), state) in &self.silver {
            let replace = out.get(key.as_str()).map_or(true, |current| {
                let ord = current
                    .compile_inputs
                    .compile_time
                    .cmp(&state.compile_inputs.compile_time)
                    .then_with(|| {
                        current
                            .security
                            .state_hash
                            .cmp(&state.security.state_hash)
                    });
                ord == std::cmp::Ordering::Less
            });
            if replace {
                out.insert(key.as_str(), state);
            }
        }
        out
    }

    /// Number of silver entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.silver.len()
    }

    /// Whether the ledger holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.silver.is_empty()
    }
}
