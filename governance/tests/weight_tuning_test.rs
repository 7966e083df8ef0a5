//! Integration tests for closed-loop weight tuning through the governor

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use governance::config::SlaTargets;
use governance::{
    AdjustmentReason, AlertGovernor, GovernanceConfig, GovernanceEvent, InMemoryAlertStore,
    InMemoryGateway, MetricsSnapshot, PersistenceGateway, SignalSnapshot, StaticSignalSource,
    WeightOverride,
};

const W_MIN: f64 = 0.05;
const W_MAX: f64 = 0.6;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn setup() -> (Arc<StaticSignalSource>, AlertGovernor) {
    let source = Arc::new(StaticSignalSource::new());
    let governor = AlertGovernor::new(
        GovernanceConfig::default(),
        Arc::new(InMemoryAlertStore::new()),
        source.clone(),
    )
    .expect("default config is valid");
    (source, governor)
}

fn on_target() -> MetricsSnapshot {
    MetricsSnapshot::on_target(&SlaTargets::default())
}

fn assert_valid(weights: &governance::WeightVector) {
    let sum: f64 = weights.as_array().iter().sum();
    assert!((sum - 1.0).abs() < 1e-6, "sum = {sum}");
    for w in weights.as_array() {
        assert!(*w >= W_MIN - 1e-9 && *w <= W_MAX + 1e-9, "w = {w}");
    }
}

/// Test: with no observations every metric sits on target and nothing moves
#[tokio::test]
async fn test_tuning_without_data_is_deadband() {
    let (_source, governor) = setup();
    let mut receiver = governor.subscribe();
    let before = governor.weights();

    let outcome = governor.run_tuning_cycle(t0()).await.unwrap();
    assert_eq!(outcome.reason, AdjustmentReason::Deadband);
    assert!(!outcome.adjusted);
    assert_eq!(governor.weights(), before);

    let event = receiver.recv().await.unwrap();
    assert!(matches!(event, GovernanceEvent::WeightDecision { .. }));
}

/// Test: weights stay normalized and bounded across a long mixed run
#[tokio::test]
async fn test_weights_stay_normalized_and_bounded() {
    let (_source, governor) = setup();
    let inputs = [
        MetricsSnapshot {
            ack_rate: 0.1,
            ..on_target()
        },
        MetricsSnapshot {
            false_suppression_rate: 0.5,
            re_noise_rate: 0.4,
            ..on_target()
        },
        MetricsSnapshot {
            escalation_effectiveness: 0.2,
            suspected_false_rate: 0.9,
            ..on_target()
        },
        on_target(),
    ];

    for (i, metrics) in inputs.iter().cycle().take(80).enumerate() {
        let outcome = governor
            .compute_adjustment_at(metrics, t0() + Duration::minutes(i as i64 * 5))
            .await;
        assert_valid(&outcome.weights);
    }
    assert_valid(&governor.weights());
}

/// Test: a cooldown cycle leaves the weights bit-for-bit identical
#[tokio::test]
async fn test_cooldown_is_a_true_no_op() {
    let (_source, governor) = setup();
    let low_ack = MetricsSnapshot {
        ack_rate: 0.4,
        ..on_target()
    };

    let first = governor.compute_adjustment_at(&low_ack, t0()).await;
    assert_eq!(first.reason, AdjustmentReason::Applied);
    let before = governor.weights();

    let second = governor
        .compute_adjustment_at(&low_ack, t0() + Duration::minutes(5))
        .await;
    assert_eq!(second.reason, AdjustmentReason::Cooldown);
    for (a, b) in before.as_array().iter().zip(governor.weights().as_array()) {
        assert_eq!(a.to_bits(), b.to_bits());
    }
}

/// Test: the controller freezes once errors stay inside the band
#[tokio::test]
async fn test_freeze_after_stable_cycles() {
    let (_source, governor) = setup();
    for i in 0..5 {
        governor
            .compute_adjustment_at(&on_target(), t0() + Duration::minutes(i * 5))
            .await;
    }
    assert!(governor.controller_state().frozen);
}

/// Test: suppression observations flow into the next tuning cycle
#[tokio::test]
async fn test_tuning_reads_suppression_signals() {
    let (source, governor) = setup();
    source.set(
        "noisy",
        SignalSnapshot {
            ack_rate: 0.05,
            suspected_false_rate: 0.8,
            volume: 25.0,
            dedup_ratio: 0.9,
            escalation_effectiveness: 0.1,
            severity: None,
        },
    );
    governor
        .evaluate_suppression_window_at(&["noisy".to_string()], t0())
        .await;

    let at = t0() + Duration::minutes(1);
    let metrics = governor.metrics_snapshot(at).unwrap();
    assert_eq!(metrics.ack_rate, 0.05);
    assert_eq!(metrics.suspected_false_rate, 0.8);
    assert_eq!(metrics.escalation_effectiveness, 0.1);

    let outcome = governor.run_tuning_cycle(at).await.unwrap();
    assert!(outcome.adjusted);
    assert_valid(&outcome.weights);
}

/// Test: overrides are audited to the gateway with a weights snapshot
#[tokio::test]
async fn test_override_is_audited() {
    let source = Arc::new(StaticSignalSource::new());
    let gateway = Arc::new(InMemoryGateway::new());
    let governor = AlertGovernor::new(
        GovernanceConfig::default(),
        Arc::new(InMemoryAlertStore::new()),
        source,
    )
    .unwrap()
    .with_gateway(gateway.clone());

    let outcome = governor
        .set_weights(&WeightOverride {
            w5: Some(0.6),
            ..Default::default()
        })
        .await;
    assert_eq!(outcome.reason, AdjustmentReason::Override);
    assert_valid(&outcome.weights);

    let audit = gateway.weight_audit();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].weights, outcome.weights);

    let saved = gateway.load_latest_weights().await.unwrap().unwrap();
    assert_eq!(saved.weights, governor.weights());
}
