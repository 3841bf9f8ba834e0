//! Signals: immutable event envelopes, the sole input to trust evolution.
//!
//! `signal_id` is the canonical hash of the envelope minus the id itself,
//! so a signal's identity is bound to its content. Unknown signal types
//! deserialize losslessly and replay as no-ops, letting newer policies
//! reinterpret history without breaking older readers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::canonical::{canonical_hash, quantize};
use crate::temporal::canonical_datetime;

/// The closed set of signal types, plus a forward-compatible passthrough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SignalType {
    /// An observation entered the system.
    ObservationSubmitted,
    /// A validator voted on a truth key.
    ValidationVote,
    /// The compiler emitted a verified truth outcome.
    TruthVerified,
    /// One agent vouched for another.
    Vouch,
    /// An agent joined a squad.
    MemberOf,
    /// A validation window opened.
    WindowOpened,
    /// A validation window closed.
    WindowClosed,
    /// A validation window was extended.
    WindowExtended,
    /// A validation window was aborted.
    WindowAborted,
    /// An agent was flagged for isolation-pattern behavior.
    IsolationFlag,
    /// An agent was registered.
    AgentRegistered,
    /// A policy was registered as an agent.
    PolicyRegistered,
    /// A type this build does not know; replays as a no-op.
    Unknown(String),
}

impl SignalType {
    /// The canonical SCREAMING_SNAKE_CASE name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ObservationSubmitted => "OBSERVATION_SUBMITTED",
            Self::ValidationVote => "VALIDATION_VOTE",
            Self::TruthVerified => "TRUTH_VERIFIED",
            Self::Vouch => "VOUCH",
            Self::MemberOf => "MEMBER_OF",
            Self::WindowOpened => "WINDOW_OPENED",
            Self::WindowClosed => "WINDOW_CLOSED",
            Self::WindowExtended => "WINDOW_EXTENDED",
            Self::WindowAborted => "WINDOW_ABORTED",
            Self::IsolationFlag => "ISOLATION_FLAG",
            Self::AgentRegistered => "AGENT_REGISTERED",
            Self::PolicyRegistered => "POLICY_REGISTERED",
            Self::Unknown(name) => name,
        }
    }
}

impl From<String> for SignalType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "OBSERVATION_SUBMITTED" => Self::ObservationSubmitted,
            "VALIDATION_VOTE" => Self::ValidationVote,
            "TRUTH_VERIFIED" => Self::TruthVerified,
            "VOUCH" => Self::Vouch,
            "MEMBER_OF" => Self::MemberOf,
            "WINDOW_OPENED" => Self::WindowOpened,
            "WINDOW_CLOSED" => Self::WindowClosed,
            "WINDOW_EXTENDED" => Self::WindowExtended,
            "WINDOW_ABORTED" => Self::WindowAborted,
            "ISOLATION_FLAG" => Self::IsolationFlag,
            "AGENT_REGISTERED" => Self::AgentRegistered,
            "POLICY_REGISTERED" => Self::PolicyRegistered,
            _ => Self::Unknown(value),
        }
    }
}

impl From<SignalType> for String {
    fn from(value: SignalType) -> Self {
        value.as_str().to_string()
    }
}

/// Vote choices carried in `VALIDATION_VOTE` payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteChoiceSignal {
    /// Agree the claim is true.
    Ratify,
    /// Claim is false.
    Reject,
    /// No position.
    Abstain,
}

impl VoteChoiceSignal {
    /// The canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ratify => "RATIFY",
            Self::Reject => "REJECT",
            Self::Abstain => "ABSTAIN",
        }
    }
}

/// Optional context attached to a signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SignalContext {
    /// Coordinating probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_id: Option<String>,
    /// Claim type the signal concerns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_type_id: Option<String>,
    /// Validation window the signal belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_id: Option<String>,
}

impl SignalContext {
    fn is_empty(&self) -> bool {
        self.probe_id.is_none() && self.claim_type_id.is_none() && self.window_id.is_none()
    }

    fn canonical(&self) -> Value {
        let mut obj = Map::new();
        if let Some(probe_id) = &self.probe_id {
            obj.insert("probe_id".into(), json!(probe_id));
        }
        if let Some(claim_type_id) = &self.claim_type_id {
            obj.insert("claim_type_id".into(), json!(claim_type_id.to_lowercase()));
        }
        if let Some(window_id) = &self.window_id {
            obj.insert("window_id".into(), json!(window_id));
        }
        Value::Object(obj)
    }
}

/// An immutable signal envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Canonical hash of the envelope minus this field.
    pub signal_id: String,
    /// The signal type.
    pub signal_type: SignalType,
    /// When the signal occurred (UTC).
    pub time: DateTime<Utc>,
    /// The emitting agent.
    pub agent_id: String,
    /// What the signal is about: an agent, truth key, window, or probe.
    pub object_id: String,
    /// Optional context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<SignalContext>,
    /// Type-specific payload.
    #[serde(default)]
    pub payload: BTreeMap<String, Value>,
    /// Policy version in force when the signal was emitted.
    pub policy_version: String,
    /// Optional detached signature over the envelope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Signal {
    /// Creates a signal, computing its content-bound id.
    #[must_use]
    pub fn new(
        signal_type: SignalType,
        time: DateTime<Utc>,
        agent_id: impl Into<String>,
        object_id: impl Into<String>,
        context: Option<SignalContext>,
        payload: BTreeMap<String, Value>,
        policy_version: impl Into<String>,
    ) -> Self {
        let mut signal = Self {
            signal_id: String::new(),
            signal_type,
            time,
            agent_id: agent_id.into(),
            object_id: object_id.into(),
            context,
            payload,
            policy_version: policy_version.into(),
            signature: None,
        };
        signal.signal_id = signal.compute_id();
        signal
    }

    /// The canonical envelope minus `signal_id` and `signature`.
    #[must_use]
    pub fn canonical_envelope(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("signal_type".into(), json!(self.signal_type.as_str()));
        obj.insert("time".into(), json!(canonical_datetime(self.time)));
        obj.insert("agent_id".into(), json!(self.agent_id));
        obj.insert("object_id".into(), json!(self.object_id));
        if let Some(context) = &self.context {
            if !context.is_empty() {
                obj.insert("context".into(), context.canonical());
            }
        }
        obj.insert(
            "payload".into(),
            Value::Object(self.payload.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        );
        obj.insert("policy_version".into(), json!(self.policy_version));
        Value::Object(obj)
    }

    /// Computes the content-bound id.
    #[must_use]
    pub fn compute_id(&self) -> String {
        canonical_hash(&self.canonical_envelope()).unwrap_or_default()
    }

    /// Whether the stored id matches the envelope content.
    #[must_use]
    pub fn verify_id(&self) -> bool {
        !self.signal_id.is_empty() && self.signal_id == self.compute_id()
    }

    // ----------------------------------------------------------------
    // Constructors for the common emissions
    // ----------------------------------------------------------------

    /// `AGENT_REGISTERED`: bootstraps an agent with a role.
    #[must_use]
    pub fn agent_registered(
        agent_id: &str,
        role: &str,
        time: DateTime<Utc>,
        policy_version: &str,
    ) -> Self {
        Self::new(
            SignalType::AgentRegistered,
            time,
            "system:trust",
            agent_id,
            None,
            BTreeMap::from([("role".to_string(), json!(role))]),
            policy_version,
        )
    }

    /// `POLICY_REGISTERED`: registers a policy as an agent.
    #[must_use]
    pub fn policy_registered(
        policy_agent_id: &str,
        version: &str,
        time: DateTime<Utc>,
    ) -> Self {
        Self::new(
            SignalType::PolicyRegistered,
            time,
            "system:trust",
            policy_agent_id,
            None,
            BTreeMap::from([("version".to_string(), json!(version))]),
            version,
        )
    }

    /// `OBSERVATION_SUBMITTED`: an observer reported against a probe or
    /// truth key.
    #[must_use]
    pub fn observation_submitted(
        observer_id: &str,
        object_id: &str,
        claim_type_id: Option<&str>,
        time: DateTime<Utc>,
        policy_version: &str,
    ) -> Self {
        let context = claim_type_id.map(|id| SignalContext {
            claim_type_id: Some(id.to_string()),
            ..SignalContext::default()
        });
        Self::new(
            SignalType::ObservationSubmitted,
            time,
            observer_id,
            object_id,
            context,
            BTreeMap::new(),
            policy_version,
        )
    }

    /// `VALIDATION_VOTE`: a validator voted on a truth key.
    #[must_use]
    pub fn validation_vote(
        voter_id: &str,
        truth_key: &str,
        choice: VoteChoiceSignal,
        confidence: Option<f64>,
        claim_type_id: Option<&str>,
        time: DateTime<Utc>,
        policy_version: &str,
    ) -> Self {
        let mut payload = BTreeMap::from([("choice".to_string(), json!(choice.as_str()))]);
        if let Some(c) = confidence {
            payload.insert("confidence".into(), json!(quantize(c).unwrap_or(0.0)));
        }
        let context = claim_type_id.map(|id| SignalContext {
            claim_type_id: Some(id.to_string()),
            ..SignalContext::default()
        });
        Self::new(
            SignalType::ValidationVote,
            time,
            voter_id,
            truth_key,
            context,
            payload,
            policy_version,
        )
    }

    /// `TRUTH_VERIFIED`: a truth outcome feeding standing updates.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn truth_verified(
        truth_key: &str,
        status: &str,
        contributors: &[String],
        outcome: &str,
        confidence: f64,
        claim_type_id: Option<&str>,
        time: DateTime<Utc>,
        policy_version: &str,
    ) -> Self {
        let payload = BTreeMap::from([
            ("status".to_string(), json!(status)),
            ("outcome".to_string(), json!(outcome)),
            ("confidence".to_string(), json!(quantize(confidence).unwrap_or(0.0))),
            ("contributors".to_string(), json!(contributors)),
        ]);
        let context = claim_type_id.map(|id| SignalContext {
            claim_type_id: Some(id.to_string()),
            ..SignalContext::default()
        });
        Self::new(
            SignalType::TruthVerified,
            time,
            "system:truth",
            truth_key,
            context,
            payload,
            policy_version,
        )
    }

    /// `VOUCH`: an explicit trust edge from `voucher` to `vouchee`.
    #[must_use]
    pub fn vouch(
        voucher_id: &str,
        vouchee_id: &str,
        time: DateTime<Utc>,
        policy_version: &str,
    ) -> Self {
        Self::new(
            SignalType::Vouch,
            time,
            voucher_id,
            vouchee_id,
            None,
            BTreeMap::new(),
            policy_version,
        )
    }

    /// `WINDOW_OPENED`: a validation window opened for a truth key.
    #[must_use]
    pub fn window_opened(
        window_id: &str,
        truth_key: &str,
        probe_id: Option<&str>,
        policy_hash: &str,
        t_close: DateTime<Utc>,
        time: DateTime<Utc>,
        policy_version: &str,
    ) -> Self {
        let payload = BTreeMap::from([
            ("policy_hash".to_string(), json!(policy_hash)),
            ("t_close".to_string(), json!(canonical_datetime(t_close))),
        ]);
        let context = Some(SignalContext {
            probe_id: probe_id.map(str::to_string),
            window_id: Some(window_id.to_string()),
            ..SignalContext::default()
        });
        Self::new(
            SignalType::WindowOpened,
            time,
            "system:trust",
            truth_key,
            context,
            payload,
            policy_version,
        )
    }
}

/// A validation window reconstructed from signed `WINDOW_*` signals.
///
/// Derived state only; never persisted as source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationWindow {
    /// Window id.
    pub window_id: String,
    /// The truth key under validation.
    pub truth_key: String,
    /// The coordinating probe, when any.
    pub probe_id: Option<String>,
    /// Hash of the policy in force.
    pub policy_hash: Option<String>,
    /// When the window opened.
    pub t_open: DateTime<Utc>,
    /// When the window closes (extended windows carry the latest close).
    pub t_close: Option<DateTime<Utc>>,
    /// Whether the window was aborted.
    pub aborted: bool,
}

impl ValidationWindow {
    /// Rebuilds a window from its `WINDOW_*` signals.
    ///
    /// Returns `None` when no `WINDOW_OPENED` for `window_id` exists in the
    /// slice.
    #[must_use]
    pub fn from_signals(signals: &[Signal], window_id: &str) -> Option<Self> {
        let mut relevant: Vec<&Signal> = signals
            .iter()
            .filter(|s| {
                s.context
                    .as_ref()
                    .and_then(|c| c.window_id.as_deref())
                    .is_some_and(|id| id == window_id)
            })
            .collect();
        relevant.sort_by(|a, b| (a.time, &a.signal_id).cmp(&(b.time, &b.signal_id)));

        let opened = relevant
            .iter()
            .find(|s| s.signal_type == SignalType::WindowOpened)?;
        let mut window = Self {
            window_id: window_id.to_string(),
            truth_key: opened.object_id.clone(),
            probe_id: opened.context.as_ref().and_then(|c| c.probe_id.clone()),
            policy_hash: opened
                .payload
                .get("policy_hash")
                .and_then(Value::as_str)
                .map(str::to_string),
            t_open: opened.time,
            t_close: opened
                .payload
                .get("t_close")
                .and_then(Value::as_str)
                .and_then(|s| crate::temporal::parse_datetime(s).ok()),
            aborted: false,
        };
        for signal in &relevant {
            match signal.signal_type {
                SignalType::WindowExtended => {
                    if let Some(t) = signal
                        .payload
                        .get("t_close")
                        .and_then(Value::as_str)
                        .and_then(|s| crate::temporal::parse_datetime(s).ok())
                    {
                        window.t_close = Some(t);
                    }
                },
                SignalType::WindowClosed => {
                    window.t_close = Some(signal.time);
                },
                SignalType::WindowAborted => {
                    window.aborted = true;
                    window.t_close = Some(signal.time);
                },
                _ => {},
            }
        }
        Some(window)
    }
}

#[cfg(test)]
mod tests {
    use crate::temporal::parse_datetime;

    use super::*;

    fn t(s: &str) -> DateTime<Utc> {
        parse_datetime(s).unwrap()
    }

    #[test]
    fn test_signal_id_is_content_bound() {
        let a = Signal::agent_registered("agent:a", "observer", t("2026-01-07T10:00:00Z"), "v1");
        assert_eq!(a.signal_id.len(), 64);
        assert!(a.verify_id());

        let b = Signal::agent_registered("agent:b", "observer", t("2026-01-07T10:00:00Z"), "v1");
        assert_ne!(a.signal_id, b.signal_id);
    }

    #[test]
    fn test_signal_id_excludes_signature() {
        let mut signal =
            Signal::agent_registered("agent:a", "observer", t("2026-01-07T10:00:00Z"), "v1");
        let id = signal.signal_id.clone();
        signal.signature = Some("feed".repeat(16));
        assert_eq!(signal.compute_id(), id);
        assert!(signal.verify_id());
    }

    #[test]
    fn test_tampered_payload_breaks_id() {
        let mut signal =
            Signal::agent_registered("agent:a", "observer", t("2026-01-07T10:00:00Z"), "v1");
        signal.payload.insert("role".into(), json!("authority"));
        assert!(!signal.verify_id());
    }

    #[test]
    fn test_unknown_type_round_trips() {
        let signal = Signal::new(
            SignalType::Unknown("FUTURE_SIGNAL".into()),
            t("2026-01-07T10:00:00Z"),
            "agent:a",
            "object:x",
            None,
            BTreeMap::new(),
            "v1",
        );
        let text = serde_json::to_string(&signal).unwrap();
        let back: Signal = serde_json::from_str(&text).unwrap();
        assert_eq!(back.signal_type, SignalType::Unknown("FUTURE_SIGNAL".into()));
        assert!(back.verify_id());
    }

    #[test]
    fn test_serde_round_trip_preserves_id() {
        let signal = Signal::validation_vote(
            "agent:v",
            "earth:flood:h3:x:surface:2026-01-07T10:00Z",
            VoteChoiceSignal::Ratify,
            Some(0.85),
            Some("earth.flood.v1"),
            t("2026-01-07T10:30:00Z"),
            "v1",
        );
        let text = serde_json::to_string(&signal).unwrap();
        let back: Signal = serde_json::from_str(&text).unwrap();
        assert_eq!(signal, back);
        assert!(back.verify_id());
    }

    #[test]
    fn test_window_reconstruction() {
        let open = Signal::window_opened(
            "win-1",
            "earth:flood:h3:x:surface:2026-01-07T10:00Z",
            Some("probe-1"),
            &"a".repeat(64),
            t("2026-01-07T11:00:00Z"),
            t("2026-01-07T10:00:00Z"),
            "v1",
        );
        let mut close = Signal::new(
            SignalType::WindowClosed,
            t("2026-01-07T11:00:00Z"),
            "system:trust",
            "earth:flood:h3:x:surface:2026-01-07T10:00Z",
            Some(SignalContext {
                window_id: Some("win-1".into()),
                ..SignalContext::default()
            }),
            BTreeMap::new(),
            "v1",
        );
        close.signal_id = close.compute_id();

        let window =
            ValidationWindow::from_signals(&[open, close], "win-1").unwrap();
        assert_eq!(window.truth_key, "earth:flood:h3:x:surface:2026-01-07T10:00Z");
        assert_eq!(window.probe_id.as_deref(), Some("probe-1"));
        assert_eq!(window.t_open, t("2026-01-07T10:00:00Z"));
        assert_eq!(window.t_close, Some(t("2026-01-07T11:00:00Z")));
        assert!(!window.aborted);
    }

    #[test]
    fn test_window_abort() {
        let open = Signal::window_opened(
            "win-2",
            "earth:flood:h3:x:surface:2026-01-07T10:00Z",
            None,
            &"a".repeat(64),
            t("2026-01-07T11:00:00Z"),
            t("2026-01-07T10:00:00Z"),
            "v1",
        );
        let abort = Signal::new(
            SignalType::WindowAborted,
            t("2026-01-07T10:20:00Z"),
            "system:trust",
            "earth:flood:h3:x:surface:2026-01-07T10:00Z",
            Some(SignalContext {
                window_id: Some("win-2".into()),
                ..SignalContext::default()
            }),
            BTreeMap::new(),
            "v1",
        );
        let window = ValidationWindow::from_signals(&[open, abort], "win-2").unwrap();
        assert!(window.aborted);
        assert_eq!(window.t_close, Some(t("2026-01-07T10:20:00Z")));
    }

    #[test]
    fn test_missing_window_returns_none() {
        assert!(ValidationWindow::from_signals(&[], "nope").is_none());
    }
}
