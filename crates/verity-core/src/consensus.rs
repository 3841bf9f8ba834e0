//! Weighted-threshold consensus.
//!
//! Votes are aggregated as `Σ weight × vote_value`, where each voter's
//! weight is the contract role weight for their standing class multiplied by
//! their effective power from the trust snapshot. Votes from agents below
//! the resolved admissibility floor are recorded but excluded from the
//! score.
//!
//! Decision rules are conservative at the boundary: a score exactly at a
//! threshold does not finalize.

use serde::{Deserialize, Serialize};

use crate::primitives::{
    ClaimType, ConsensusRecord, RiskProfile, TrustSnapshot, VerificationBasis,
};

/// Vote choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteChoice {
    /// Agree the claim is true. Value `+1`.
    Ratify,
    /// Claim is false. Value `-1`.
    Reject,
    /// No position. Value `0`.
    Abstain,
    /// Dispute the process rather than the claim. Value `0`.
    Challenge,
    /// Authority decision that finalizes immediately.
    Override,
}

/// A validation vote entering consensus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationVote {
    /// The voting agent.
    pub voter_id: String,
    /// The choice.
    pub choice: VoteChoice,
    /// Voter's stated confidence, when provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Whether the voter is human (counts toward critical-lane quorum).
    #[serde(default)]
    pub is_human: bool,
    /// For `Override` votes: the verdict being imposed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_verdict: Option<bool>,
}

/// Candidate status produced by consensus, before the compiler merges in
/// lane rules and AI autovalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateStatus {
    /// Threshold crossed upward.
    VerifiedTrue,
    /// Threshold crossed downward.
    VerifiedFalse,
    /// Neither threshold crossed.
    Inconclusive,
    /// Critical lane with quorum unmet; not finalizable.
    PendingHumanReview,
}

/// The outcome of a consensus evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusOutcome {
    /// Candidate status.
    pub candidate: CandidateStatus,
    /// Verification basis when a decision was reached.
    pub basis: Option<VerificationBasis>,
    /// The audit record stored on the truth state.
    pub record: ConsensusRecord,
}

/// Resolves the admissibility floor: the policy baseline tightened — never
/// loosened — by the contract and an optional probe override.
///
/// Downstream actors may only raise θ_min above the policy baseline.
#[must_use]
pub fn resolve_theta_min(
    policy_theta_min: f64,
    contract_theta_min: Option<f64>,
    probe_theta_min: Option<f64>,
) -> f64 {
    let mut resolved = policy_theta_min;
    if let Some(t) = contract_theta_min {
        resolved = resolved.max(t);
    }
    if let Some(t) = probe_theta_min {
        resolved = resolved.max(t);
    }
    resolved
}

/// Evaluates weighted-threshold consensus over a set of votes.
///
/// `theta_min` is the already-resolved admissibility floor (see
/// [`resolve_theta_min`]). Voters whose snapshot standing is below it are
/// recorded in `excluded_voters` and contribute nothing to the score.
#[must_use]
pub fn evaluate_consensus(
    claim_type: &ClaimType,
    snapshot: &TrustSnapshot,
    votes: &[ValidationVote],
    theta_min: f64,
) -> ConsensusOutcome {
    let model = &claim_type.consensus_model;
    let mut record = ConsensusRecord {
        positive_ratio: 0.5,
        ..ConsensusRecord::default()
    };

    let mut score = 0.0;
    let mut human_ratifiers: Vec<&str> = Vec::new();

    for vote in votes {
        let standing = snapshot.standing(&vote.voter_id);
        if standing < theta_min {
            // Recorded but not scored.
            record.excluded_voters.push(vote.voter_id.clone());
            continue;
        }

        let class = snapshot
            .agent_trust(&vote.voter_id)
            .map_or("bronze", |t| t.derived_class.as_str());
        let weight = model.role_weight(class) * snapshot.effective_power(&vote.voter_id);

        match vote.choice {
            VoteChoice::Ratify => {
                score += weight;
                record.ratify_count += 1;
                if vote.is_human {
                    human_ratifiers.push(&vote.voter_id);
                }
            },
            VoteChoice::Reject => {
                score -= weight;
                record.reject_count += 1;
            },
            VoteChoice::Abstain | VoteChoice::Challenge => {
                record.abstain_count += 1;
            },
            VoteChoice::Override => {
                // Only authority-class voters may override; others are
                // counted as abstentions.
                if class == "authority" {
                    let verdict = vote.override_verdict.unwrap_or(true);
                    record.finalized = true;
                    record.finalize_reason =
                        Some(format!("AUTHORITY_OVERRIDE by {}", vote.voter_id));
                    record.score = score;
                    record.positive_ratio = if verdict { 1.0 } else { 0.0 };
                    let candidate = if verdict {
                        CandidateStatus::VerifiedTrue
                    } else {
                        CandidateStatus::VerifiedFalse
                    };
                    return ConsensusOutcome {
                        candidate,
                        basis: Some(VerificationBasis::AuthorityOverride),
                        record,
                    };
                }
                record.abstain_count += 1;
            },
        }
    }

    record.excluded_voters.sort();
    record.score = score;

    let total = record.ratify_count + record.reject_count;
    if total > 0 {
        let ratio = (f64::from(record.ratify_count) - f64::from(record.reject_count))
            / f64::from(total);
        record.positive_ratio = (ratio + 1.0) / 2.0;
    }

    // Strict comparison: a score exactly at a threshold stays open.
    let (candidate, basis) = if score > model.finalize_threshold {
        human_ratifiers.sort_unstable();
        human_ratifiers.dedup();
        if claim_type.risk_profile == RiskProfile::Critical
            && (human_ratifiers.len() as u32) < model.human_quorum.max(1)
        {
            // Critical lane forbids finalizing true without human quorum.
            (CandidateStatus::PendingHumanReview, None)
        } else {
            record.finalized = true;
            record.finalize_reason = Some(format!("THRESHOLD_REACHED (score={score:.1})"));
            (
                CandidateStatus::VerifiedTrue,
                Some(VerificationBasis::HumanConsensus),
            )
        }
    } else if score < model.reject_threshold {
        record.finalized = true;
        record.finalize_reason = Some(format!("REJECT_THRESHOLD (score={score:.1})"));
        (
            CandidateStatus::VerifiedFalse,
            Some(VerificationBasis::HumanConsensus),
        )
    } else {
        (CandidateStatus::Inconclusive, None)
    };

    ConsensusOutcome {
        candidate,
        basis,
        record,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::primitives::{AgentTrust, ContextModifiers};
    use crate::temporal::parse_datetime;

    use super::*;

    fn entry(agent_id: &str, power: f64, standing: f64, class: &str) -> (String, AgentTrust) {
        (
            agent_id.to_string(),
            AgentTrust {
                agent_id: agent_id.to_string(),
                effective_power: power,
                standing,
                derived_class: class.to_string(),
                flags: vec![],
                context_modifiers: ContextModifiers::default(),
            },
        )
    }

    fn snapshot(entries: Vec<(String, AgentTrust)>) -> TrustSnapshot {
        TrustSnapshot::create(
            "snap-test",
            parse_datetime("2026-01-07T12:00:00Z").unwrap(),
            entries.into_iter().collect::<BTreeMap<_, _>>(),
        )
        .unwrap()
    }

    fn vote(voter: &str, choice: VoteChoice) -> ValidationVote {
        ValidationVote {
            voter_id: voter.to_string(),
            choice,
            confidence: None,
            is_human: true,
            override_verdict: None,
        }
    }

    fn contract() -> ClaimType {
        crate::primitives::test_support::flood_contract()
    }

    #[test]
    fn test_weighted_score_crosses_finalize_threshold() {
        // Two experts at weight 7 with power 1.2 ratifying: score 16.8 > 15.
        let snap = snapshot(vec![
            entry("agent:e1", 1.2, 400.0, "expert"),
            entry("agent:e2", 1.2, 400.0, "expert"),
        ]);
        let votes = [vote("agent:e1", VoteChoice::Ratify), vote("agent:e2", VoteChoice::Ratify)];
        let outcome = evaluate_consensus(&contract(), &snap, &votes, 0.0);
        assert_eq!(outcome.candidate, CandidateStatus::VerifiedTrue);
        assert_eq!(outcome.basis, Some(VerificationBasis::HumanConsensus));
        assert!(outcome.record.finalized);
    }

    #[test]
    fn test_score_below_threshold_is_inconclusive() {
        let snap = snapshot(vec![entry("agent:s1", 1.05, 200.0, "silver")]);
        let votes = [vote("agent:s1", VoteChoice::Ratify)];
        let outcome = evaluate_consensus(&contract(), &snap, &votes, 0.0);
        assert_eq!(outcome.candidate, CandidateStatus::Inconclusive);
        assert!(!outcome.record.finalized);
    }

    #[test]
    fn test_exact_threshold_does_not_finalize() {
        // One authority at weight 10, power 1.5: score exactly 15.0.
        let snap = snapshot(vec![entry("agent:a1", 1.5, 800.0, "authority")]);
        let votes = [vote("agent:a1", VoteChoice::Ratify)];
        let outcome = evaluate_consensus(&contract(), &snap, &votes, 0.0);
        assert_eq!(outcome.candidate, CandidateStatus::Inconclusive);
    }

    #[test]
    fn test_reject_threshold() {
        let snap = snapshot(vec![
            entry("agent:e1", 1.2, 400.0, "expert"),
            entry("agent:a1", 1.1, 800.0, "authority"),
        ]);
        let votes = [
            vote("agent:e1", VoteChoice::Reject),
            vote("agent:a1", VoteChoice::Reject),
        ];
        // Score: -(7*1.2 + 10*1.1) = -19.4 < -10.
        let outcome = evaluate_consensus(&contract(), &snap, &votes, 0.0);
        assert_eq!(outcome.candidate, CandidateStatus::VerifiedFalse);
    }

    #[test]
    fn test_admissibility_filter_excludes_low_standing() {
        let snap = snapshot(vec![
            entry("agent:low", 5.0, 50.0, "expert"),
            entry("agent:ok", 1.05, 200.0, "silver"),
        ]);
        let votes = [
            vote("agent:low", VoteChoice::Ratify),
            vote("agent:ok", VoteChoice::Ratify),
        ];
        let outcome = evaluate_consensus(&contract(), &snap, &votes, 100.0);
        // Only the silver vote scores: 3 * 1.05.
        assert!((outcome.record.score - 3.15).abs() < 1e-9);
        assert_eq!(outcome.record.excluded_voters, vec!["agent:low".to_string()]);
        assert_eq!(outcome.record.ratify_count, 1);
    }

    #[test]
    fn test_theta_min_resolution_tightens_only() {
        assert!((resolve_theta_min(10.0, Some(50.0), None) - 50.0).abs() < f64::EPSILON);
        assert!((resolve_theta_min(10.0, Some(5.0), None) - 10.0).abs() < f64::EPSILON);
        assert!((resolve_theta_min(10.0, Some(50.0), Some(80.0)) - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_authority_override_finalizes_immediately() {
        let snap = snapshot(vec![
            entry("agent:a1", 1.1, 800.0, "authority"),
            entry("agent:e1", 1.2, 400.0, "expert"),
        ]);
        let votes = [
            vote("agent:e1", VoteChoice::Reject),
            ValidationVote {
                voter_id: "agent:a1".into(),
                choice: VoteChoice::Override,
                confidence: None,
                is_human: true,
                override_verdict: Some(true),
            },
        ];
        let outcome = evaluate_consensus(&contract(), &snap, &votes, 0.0);
        assert_eq!(outcome.candidate, CandidateStatus::VerifiedTrue);
        assert_eq!(outcome.basis, Some(VerificationBasis::AuthorityOverride));
        assert!(outcome.record.finalize_reason.as_deref().unwrap().contains("agent:a1"));
    }

    #[test]
    fn test_non_authority_override_is_abstention() {
        let snap = snapshot(vec![entry("agent:s1", 1.05, 200.0, "silver")]);
        let votes = [ValidationVote {
            voter_id: "agent:s1".into(),
            choice: VoteChoice::Override,
            confidence: None,
            is_human: true,
            override_verdict: Some(true),
        }];
        let outcome = evaluate_consensus(&contract(), &snap, &votes, 0.0);
        assert_eq!(outcome.candidate, CandidateStatus::Inconclusive);
        assert_eq!(outcome.record.abstain_count, 1);
    }

    #[test]
    fn test_critical_lane_requires_human_quorum() {
        let mut critical = contract();
        critical.risk_profile = RiskProfile::Critical;
        critical.consensus_model.human_quorum = 1;

        let snap = snapshot(vec![
            entry("sensor:1", 1.2, 700.0, "authority"),
            entry("sensor:2", 1.2, 700.0, "authority"),
        ]);
        let mut votes = vec![
            vote("sensor:1", VoteChoice::Ratify),
            vote("sensor:2", VoteChoice::Ratify),
        ];
        for v in &mut votes {
            v.is_human = false;
        }
        let outcome = evaluate_consensus(&critical, &snap, &votes, 0.0);
        assert_eq!(outcome.candidate, CandidateStatus::PendingHumanReview);
        assert!(!outcome.record.finalized);
    }

    #[test]
    fn test_positive_ratio() {
        let snap = snapshot(vec![
            entry("agent:1", 1.0, 200.0, "silver"),
            entry("agent:2", 1.0, 200.0, "silver"),
            entry("agent:3", 1.0, 200.0, "silver"),
        ]);
        let votes = [
            vote("agent:1", VoteChoice::Ratify),
            vote("agent:2", VoteChoice::Ratify),
            vote("agent:3", VoteChoice::Reject),
        ];
        let outcome = evaluate_consensus(&contract(), &snap, &votes, 0.0);
        // ((2 - 1) / 3 + 1) / 2 = 2/3.
        assert!((outcome.record.positive_ratio - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_votes_yields_neutral_ratio() {
        let snap = snapshot(vec![]);
        let outcome = evaluate_consensus(&contract(), &snap, &[], 0.0);
        assert!((outcome.record.positive_ratio - 0.5).abs() < f64::EPSILON);
        assert_eq!(outcome.candidate, CandidateStatus::Inconclusive);
    }
}
