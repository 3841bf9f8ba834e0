//! Signal store: the append-only log abstraction.
//!
//! Stores guarantee append-only semantics — no deletion, no update — and a
//! total order by `(time, signal_id)` with lexicographic id tiebreak.
//! Append order is not authoritative; the `(time, signal_id)` order is.
//!
//! Two reference implementations ship with the core: an in-memory store for
//! tests and embedding, and a line-delimited JSON store for simple
//! deployments. Production backends live outside the core and implement
//! [`SignalStore`].

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use super::signal::{Signal, SignalType};

/// Errors from signal stores.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// A signal with this id already exists in the log.
    ///
    /// The caller can retry with an adjusted `time` or id.
    #[error("signal ordering conflict: id {signal_id} already present")]
    Conflict {
        /// The conflicting signal id.
        signal_id: String,
    },

    /// The signal's stored id does not match its content.
    #[error("signal id does not match envelope content: {signal_id}")]
    IdMismatch {
        /// The stored (wrong) id.
        signal_id: String,
    },

    /// I/O failure in a file-backed store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted line could not be decoded.
    #[error("corrupt signal record: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl StoreError {
    /// Stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Conflict { .. } | Self::IdMismatch { .. } => "signal_ordering_violation",
            Self::Io(_) | Self::Corrupt(_) => "signal_store_exhausted",
        }
    }
}

/// The append-only signal log abstraction.
///
/// Writers serialize on `append`; readers see a consistent prefix. All
/// query results are ordered by `(time, signal_id)`.
pub trait SignalStore {
    /// Appends a signal.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] for duplicate ids and
    /// [`StoreError::IdMismatch`] when the id does not match the content.
    fn append(&mut self, signal: Signal) -> Result<(), StoreError>;

    /// All signals in canonical order.
    fn get_all(&self) -> Vec<Signal>;

    /// Signals where the agent is emitter or object.
    fn get_for_agent(&self, agent_id: &str) -> Vec<Signal>;

    /// Signals at or after `since`.
    fn get_since(&self, since: DateTime<Utc>) -> Vec<Signal>;

    /// Signals belonging to a validation window.
    fn get_window(&self, window_id: &str) -> Vec<Signal>;

    /// The policy version in force at `t`: the latest `POLICY_REGISTERED`
    /// at or before `t`.
    fn get_policy_version_at(&self, t: DateTime<Utc>) -> Option<String> {
        self.get_all()
            .into_iter()
            .filter(|s| s.signal_type == SignalType::PolicyRegistered && s.time <= t)
            .next_back()
            .map(|s| {
                s.payload
                    .get("version")
                    .and_then(Value::as_str)
                    .map_or(s.policy_version.clone(), str::to_string)
            })
    }
}

fn canonical_sort(signals: &mut [Signal]) {
    signals.sort_by(|a, b| (a.time, &a.signal_id).cmp(&(b.time, &b.signal_id)));
}

fn window_of(signal: &Signal) -> Option<&str> {
    signal.context.as_ref().and_then(|c| c.window_id.as_deref())
}

/// In-memory signal store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySignalStore {
    signals: Vec<Signal>,
    ids: BTreeSet<String>,
}

impl MemorySignalStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored signals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

impl SignalStore for MemorySignalStore {
    fn append(&mut self, signal: Signal) -> Result<(), StoreError> {
        if !signal.verify_id() {
            return Err(StoreError::IdMismatch {
                signal_id: signal.signal_id,
            });
        }
        if self.ids.contains(&signal.signal_id) {
            return Err(StoreError::Conflict {
                signal_id: signal.signal_id,
            });
        }
        self.ids.insert(signal.signal_id.clone());
        self.signals.push(signal);
        Ok(())
    }

    fn get_all(&self) -> Vec<Signal> {
        let mut out = self.signals.clone();
        canonical_sort(&mut out);
        out
    }

    fn get_for_agent(&self, agent_id: &str) -> Vec<Signal> {
        let mut out: Vec<Signal> = self
            .signals
            .iter()
            .filter(|s| s.agent_id == agent_id || s.object_id == agent_id)
            .cloned()
            .collect();
        canonical_sort(&mut out);
        out
    }

    fn get_since(&self, since: DateTime<Utc>) -> Vec<Signal> {
        let mut out: Vec<Signal> = self
            .signals
            .iter()
            .filter(|s| s.time >= since)
            .cloned()
            .collect();
        canonical_sort(&mut out);
        out
    }

    fn get_window(&self, window_id: &str) -> Vec<Signal> {
        let mut out: Vec<Signal> = self
            .signals
            .iter()
            .filter(|s| window_of(s) == Some(window_id))
            .cloned()
            .collect();
        canonical_sort(&mut out);
        out
    }
}

/// Line-delimited JSON signal store.
///
/// One signal per line; the file is only ever appended to. An in-memory id
/// index keeps appends idempotent without rescanning the file.
#[derive(Debug)]
pub struct JsonlSignalStore {
    path: PathBuf,
    ids: BTreeSet<String>,
}

impl JsonlSignalStore {
    /// Opens (creating if needed) a store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure or a corrupt record.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if !path.exists() {
            File::create(&path)?;
        }
        let mut store = Self {
            path,
            ids: BTreeSet::new(),
        };
        for signal in store.read_all()? {
            store.ids.insert(signal.signal_id);
        }
        Ok(store)
    }

    fn read_all(&self) -> Result<Vec<Signal>, StoreError> {
        let file = File::open(&self.path)?;
        let mut out = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            out.push(serde_json::from_str(&line)?);
        }
        Ok(out)
    }

    fn read_sorted(&self) -> Vec<Signal> {
        let mut signals = self.read_all().unwrap_or_default();
        canonical_sort(&mut signals);
        signals
    }
}

impl SignalStore for JsonlSignalStore {
    fn append(&mut self, signal: Signal) -> Result<(), StoreError> {
        if !signal.verify_id() {
            return Err(StoreError::IdMismatch {
                signal_id: signal.signal_id,
            });
        }
        if self.ids.contains(&signal.signal_id) {
            return Err(StoreError::Conflict {
                signal_id: signal.signal_id,
            });
        }
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        let line = serde_json::to_string(&signal)?;
        writeln!(file, "{line}")?;
        file.sync_data()?;
        tracing::trace!(signal_id = %signal.signal_id, "appended signal");
        self.ids.insert(signal.signal_id);
        Ok(())
    }

    fn get_all(&self) -> Vec<Signal> {
        self.read_sorted()
    }

    fn get_for_agent(&self, agent_id: &str) -> Vec<Signal> {
        self.read_sorted()
            .into_iter()
            .filter(|s| s.agent_id == agent_id || s.object_id == agent_id)
            .collect()
    }

    fn get_since(&self, since: DateTime<Utc>) -> Vec<Signal> {
        self.read_sorted()
            .into_iter()
            .filter(|s| s.time >= since)
            .collect()
    }

    fn get_window(&self, window_id: &str) -> Vec<Signal> {
        self.read_sorted()
            .into_iter()
            .filter(|s| window_of(s) == Some(window_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::temporal::parse_datetime;
    use crate::trust::signal::VoteChoiceSignal;

    use super::*;

    fn t(s: &str) -> DateTime<Utc> {
        parse_datetime(s).unwrap()
    }

    fn registered(agent: &str, time: &str) -> Signal {
        Signal::agent_registered(agent, "observer", t(time), "v1")
    }

    #[test]
    fn test_memory_append_and_order() {
        let mut store = MemorySignalStore::new();
        // Appended out of time order; reads come back canonical.
        store.append(registered("agent:b", "2026-01-07T11:00:00Z")).unwrap();
        store.append(registered("agent:a", "2026-01-07T10:00:00Z")).unwrap();
        let all = store.get_all();
        assert_eq!(all.len(), 2);
        assert!(all[0].time < all[1].time);
    }

    #[test]
    fn test_memory_duplicate_conflict() {
        let mut store = MemorySignalStore::new();
        let signal = registered("agent:a", "2026-01-07T10:00:00Z");
        store.append(signal.clone()).unwrap();
        let err = store.append(signal).unwrap_err();
        assert_eq!(err.code(), "signal_ordering_violation");
    }

    #[test]
    fn test_memory_rejects_tampered_id() {
        let mut store = MemorySignalStore::new();
        let mut signal = registered("agent:a", "2026-01-07T10:00:00Z");
        signal.signal_id = "0".repeat(64);
        assert!(matches!(
            store.append(signal),
            Err(StoreError::IdMismatch { .. })
        ));
    }

    #[test]
    fn test_memory_agent_and_since_queries() {
        let mut store = MemorySignalStore::new();
        store.append(registered("agent:a", "2026-01-07T10:00:00Z")).unwrap();
        store.append(registered("agent:b", "2026-01-07T11:00:00Z")).unwrap();
        store
            .append(Signal::vouch("agent:a", "agent:b", t("2026-01-07T12:00:00Z"), "v1"))
            .unwrap();

        assert_eq!(store.get_for_agent("agent:a").len(), 2);
        assert_eq!(store.get_for_agent("agent:b").len(), 2);
        assert_eq!(store.get_since(t("2026-01-07T11:00:00Z")).len(), 2);
    }

    #[test]
    fn test_same_time_orders_by_id() {
        let mut store = MemorySignalStore::new();
        let a = registered("agent:a", "2026-01-07T10:00:00Z");
        let b = registered("agent:b", "2026-01-07T10:00:00Z");
        store.append(b.clone()).unwrap();
        store.append(a.clone()).unwrap();
        let all = store.get_all();
        let expected_first = if a.signal_id < b.signal_id { &a } else { &b };
        assert_eq!(all[0].signal_id, expected_first.signal_id);
    }

    #[test]
    fn test_policy_version_at() {
        let mut store = MemorySignalStore::new();
        store
            .append(Signal::policy_registered("policy:verity", "1.0.0", t("2026-01-01T00:00:00Z")))
            .unwrap();
        store
            .append(Signal::policy_registered("policy:verity", "1.1.0", t("2026-02-01T00:00:00Z")))
            .unwrap();

        assert_eq!(
            store.get_policy_version_at(t("2026-01-15T00:00:00Z")),
            Some("1.0.0".to_string())
        );
        assert_eq!(
            store.get_policy_version_at(t("2026-03-01T00:00:00Z")),
            Some("1.1.0".to_string())
        );
        assert_eq!(store.get_policy_version_at(t("2025-01-01T00:00:00Z")), None);
    }

    #[test]
    fn test_window_query() {
        let mut store = MemorySignalStore::new();
        store
            .append(Signal::window_opened(
                "win-1",
                "earth:flood:h3:x:surface:2026-01-07T10:00Z",
                None,
                &"a".repeat(64),
                t("2026-01-07T11:00:00Z"),
                t("2026-01-07T10:00:00Z"),
                "v1",
            ))
            .unwrap();
        store.append(registered("agent:a", "2026-01-07T10:05:00Z")).unwrap();
        assert_eq!(store.get_window("win-1").len(), 1);
        assert!(store.get_window("win-2").is_empty());
    }

    #[test]
    fn test_jsonl_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signals.jsonl");

        let mut store = JsonlSignalStore::open(&path).unwrap();
        store.append(registered("agent:a", "2026-01-07T10:00:00Z")).unwrap();
        store
            .append(Signal::validation_vote(
                "agent:v",
                "earth:flood:h3:x:surface:2026-01-07T10:00Z",
                VoteChoiceSignal::Ratify,
                Some(0.8),
                None,
                t("2026-01-07T10:30:00Z"),
                "v1",
            ))
            .unwrap();
        drop(store);

        // Reopen and verify persistence plus duplicate detection.
        let mut reopened = JsonlSignalStore::open(&path).unwrap();
        assert_eq!(reopened.get_all().len(), 2);
        let err = reopened
            .append(registered("agent:a", "2026-01-07T10:00:00Z"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[test]
    fn test_jsonl_orders_canonically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signals.jsonl");
        let mut store = JsonlSignalStore::open(&path).unwrap();
        store.append(registered("agent:b", "2026-01-07T11:00:00Z")).unwrap();
        store.append(registered("agent:a", "2026-01-07T10:00:00Z")).unwrap();
        let all = store.get_all();
        assert!(all[0].time < all[1].time);
    }
}
