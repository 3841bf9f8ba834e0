//! Replay and policy-isolation properties of the trust engine, plus
//! property-based determinism sweeps.

mod common;

use proptest::prelude::*;
use serde_json::json;

use common::{FLOOD_KEY, flood_contract, observation, signer, t, trust_snapshot};
use verity_core::compiler::{CompileContext, compile_truth_state, COMPILER_VERSION};
use verity_core::primitives::StandingClass;
use verity_core::trust::{
    Signal, TrustComputer, TrustContext, TrustPolicy, TrustReducer,
};

const POLICY_VERSION: &str = "policy:verity_v1.0.0";

fn sample_log() -> Vec<Signal> {
    let mut signals = vec![
        Signal::agent_registered("agent:a", "observer", t("2026-01-01T00:00:00Z"), POLICY_VERSION),
        Signal::agent_registered("agent:b", "validator", t("2026-01-01T00:05:00Z"), POLICY_VERSION),
        Signal::vouch("agent:b", "agent:a", t("2026-01-01T01:00:00Z"), POLICY_VERSION),
    ];
    for day in 1..6 {
        let time = format!("2026-01-{:02}T12:00:00Z", day + 1);
        let outcome = if day % 3 == 0 { "incorrect" } else { "correct" };
        signals.push(Signal::truth_verified(
            FLOOD_KEY,
            if outcome == "correct" { "VERIFIED_TRUE" } else { "VERIFIED_FALSE" },
            &["agent:a".to_string()],
            outcome,
            0.85,
            Some("earth.flood.v1"),
            t(&time),
            POLICY_VERSION,
        ));
    }
    signals
}

// =========================================================================
// Reducer replay equivalence
// =========================================================================

#[test]
fn replay_is_order_independent() {
    let policy = TrustPolicy::default();
    let reducer = TrustReducer::new(&policy);
    let as_of = t("2026-01-10T00:00:00Z");

    let forward = sample_log();
    let mut shuffled = sample_log();
    shuffled.reverse();
    shuffled.swap(0, 3);

    let a = reducer.reduce(&forward, as_of, None).unwrap();
    let b = reducer.reduce(&shuffled, as_of, None).unwrap();
    assert_eq!(
        a.standings_at(as_of, &policy),
        b.standings_at(as_of, &policy)
    );
}

#[test]
fn prefix_replay_matches_full_replay_at_prefix_time() {
    let policy = TrustPolicy::default();
    let reducer = TrustReducer::new(&policy);
    let log = sample_log();
    let cutoff = t("2026-01-04T00:00:00Z");

    let prefix: Vec<Signal> = log.iter().filter(|s| s.time <= cutoff).cloned().collect();
    let from_prefix = reducer.reduce(&prefix, cutoff, None).unwrap();
    let from_full = reducer.reduce(&log, cutoff, None).unwrap();
    assert_eq!(
        from_prefix.standings_at(cutoff, &policy),
        from_full.standings_at(cutoff, &policy)
    );
}

// =========================================================================
// Policy isolation across versions
// =========================================================================

#[test]
fn policy_versions_produce_distinct_reproducible_snapshots() {
    let log = sample_log();
    let agents = vec!["agent:a".to_string(), "agent:b".to_string()];
    let context = TrustContext {
        claim_type_id: Some("earth.flood.v1".into()),
        snapshot_time: t("2026-01-10T00:00:00Z"),
    };

    let v1 = TrustPolicy::default();
    let mut v11 = TrustPolicy::default();
    v11.version = "1.1.0".into();
    v11.parent_version = Some("1.0.0".into());
    v11.update.observation_correct = 12.0;
    v11.update.observation_wrong = 18.0;
    v11.lint().unwrap();

    let snap_v1_a = TrustComputer::new(&v1).snapshot("snap", &log, &agents, &context).unwrap();
    let snap_v1_b = TrustComputer::new(&v1).snapshot("snap", &log, &agents, &context).unwrap();
    let snap_v11_a = TrustComputer::new(&v11).snapshot("snap", &log, &agents, &context).unwrap();
    let snap_v11_b = TrustComputer::new(&v11).snapshot("snap", &log, &agents, &context).unwrap();

    // Same signals, different policies: different snapshots.
    assert_ne!(snap_v1_a.snapshot_hash, snap_v11_a.snapshot_hash);
    // Each policy exactly reproduces its own hash.
    assert_eq!(snap_v1_a.snapshot_hash, snap_v1_b.snapshot_hash);
    assert_eq!(snap_v11_a.snapshot_hash, snap_v11_b.snapshot_hash);
}

// =========================================================================
// Bounded dynamics
// =========================================================================

#[test]
fn standings_stay_bounded_under_extreme_histories() {
    let policy = TrustPolicy::default();
    let reducer = TrustReducer::new(&policy);

    let mut hostile = vec![Signal::agent_registered(
        "agent:doomed",
        "observer",
        t("2026-01-01T00:00:00Z"),
        POLICY_VERSION,
    )];
    let mut blessed = vec![Signal::agent_registered(
        "agent:golden",
        "observer",
        t("2026-01-01T00:00:00Z"),
        POLICY_VERSION,
    )];
    for i in 0..500 {
        let time = format!(
            "2026-01-{:02}T{:02}:{:02}:00Z",
            1 + i / 480,
            (i / 60) % 24,
            i % 60
        );
        hostile.push(Signal::truth_verified(
            FLOOD_KEY,
            "VERIFIED_FALSE",
            &["agent:doomed".to_string()],
            "incorrect",
            1.0,
            None,
            t(&time),
            POLICY_VERSION,
        ));
        blessed.push(Signal::truth_verified(
            FLOOD_KEY,
            "VERIFIED_TRUE",
            &["agent:golden".to_string()],
            "correct",
            1.0,
            None,
            t(&time),
            POLICY_VERSION,
        ));
    }

    let as_of = t("2026-02-01T00:00:00Z");
    let low = reducer.reduce(&hostile, as_of, None).unwrap();
    let high = reducer.reduce(&blessed, as_of, None).unwrap();
    let low_standing = low.standing_at("agent:doomed", as_of, &policy);
    let high_standing = high.standing_at("agent:golden", as_of, &policy);
    assert!((0.0..=1000.0).contains(&low_standing));
    assert!((0.0..=1000.0).contains(&high_standing));
    assert!(high_standing > low_standing);
}

#[test]
fn effective_powers_are_finite_and_quantized() {
    let policy = TrustPolicy::default();
    let computer = TrustComputer::new(&policy);
    let log = sample_log();
    let agents = vec!["agent:a".to_string(), "agent:b".to_string()];
    let context = TrustContext {
        claim_type_id: Some("earth.flood.v1".into()),
        snapshot_time: t("2026-01-10T00:00:00Z"),
    };
    let snapshot = computer.snapshot("snap", &log, &agents, &context).unwrap();
    for trust in snapshot.agent_trusts.values() {
        assert!(trust.effective_power.is_finite());
        let requantized = (trust.effective_power * 1e6).round_ties_even() / 1e6;
        assert!((trust.effective_power - requantized).abs() < f64::EPSILON);
    }
}

// =========================================================================
// Property-based determinism sweeps
// =========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn compile_is_deterministic_over_inputs(
        level_a in 0.0f64..10.0,
        level_b in 0.0f64..10.0,
        score_a in 0.0f64..1.0,
        score_b in 0.0f64..1.0,
        power_a in 0.1f64..5.0,
        power_b in 0.1f64..5.0,
    ) {
        let contract = flood_contract();
        let observations = [
            observation(
                "obs-p1",
                "earth.flood.v1",
                "agent:p1",
                StandingClass::Silver,
                &[("water_level", json!(level_a))],
                "2026-01-07T11:30:00Z",
            ),
            observation(
                "obs-p2",
                "earth.flood.v1",
                "agent:p2",
                StandingClass::Expert,
                &[("water_level", json!(level_b))],
                "2026-01-07T11:40:00Z",
            ),
        ];
        let snapshot = trust_snapshot(
            "snap-prop",
            "2026-01-07T12:00:00Z",
            &[("agent:p1", power_a, 200.0, "silver"), ("agent:p2", power_b, 400.0, "expert")],
        );
        let scores = [score_a, score_b];
        let ctx = CompileContext { ai_scores: Some(&scores), ..Default::default() };

        let run = || compile_truth_state(
            &contract,
            FLOOD_KEY,
            &observations,
            &snapshot,
            POLICY_VERSION,
            COMPILER_VERSION,
            t("2026-01-07T12:00:00Z"),
            &ctx,
            &signer(),
        ).unwrap();

        let a = run();
        let b = run();
        prop_assert_eq!(&a.security.state_hash, &b.security.state_hash);
        prop_assert_eq!(&a.security.semantic_hash, &b.security.semantic_hash);
        prop_assert_eq!(&a.security.signature, &b.security.signature);
        prop_assert!(a.confidence >= 0.0 && a.confidence <= 1.0);
    }

    #[test]
    fn reducer_is_deterministic_over_orderings(seed in 0u64..1000) {
        let policy = TrustPolicy::default();
        let reducer = TrustReducer::new(&policy);
        let mut log = sample_log();
        // Deterministic pseudo-shuffle from the seed.
        let len = log.len();
        for i in 0..len {
            let j = ((seed as usize).wrapping_mul(31).wrapping_add(i * 17)) % len;
            log.swap(i, j);
        }
        let as_of = t("2026-01-10T00:00:00Z");
        let canonical = reducer.reduce(&sample_log(), as_of, None).unwrap();
        let shuffled = reducer.reduce(&log, as_of, None).unwrap();
        prop_assert_eq!(
            canonical.standings_at(as_of, &policy),
            shuffled.standings_at(as_of, &policy)
        );
    }
}
