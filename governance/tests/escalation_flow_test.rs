//! Integration tests for escalation and acknowledgement
//!
//! Covers the sweep's cooldown, idempotent acks, ack-after-escalation
//! latency and the ordering between acks and manual escalations.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use governance::store::{AckInsert, AckRecord, StoreResult};
use governance::{
    AlertGovernor, AlertRecord, AlertStore, EscalationRecord, GovernanceConfig, GovernanceError,
    InMemoryAlertStore, Severity, StaticSignalSource, StoreError,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn governor() -> AlertGovernor {
    AlertGovernor::new(
        GovernanceConfig::default(),
        Arc::new(InMemoryAlertStore::new()),
        Arc::new(StaticSignalSource::new()),
    )
    .expect("default config is valid")
}

/// Test: one escalation per alert while its cooldown runs
#[tokio::test]
async fn test_single_escalation_within_cooldown() {
    let governor = governor();
    // High: base SLA 15 min, cooldown clamp(7.5 min, 5 min, 60 min)
    governor
        .register_alert(AlertRecord::new("a1", "api-5xx", Severity::High, t0()))
        .unwrap();

    let early = governor
        .run_escalation_sweep(t0() + Duration::minutes(10))
        .await
        .unwrap();
    assert!(early.escalated.is_empty());
    assert_eq!(early.below_threshold, 1);

    let first = governor
        .run_escalation_sweep(t0() + Duration::minutes(20))
        .await
        .unwrap();
    assert_eq!(first.escalated.len(), 1);
    assert_eq!(first.escalated[0].threshold_ms, 900_000);

    let second = governor
        .run_escalation_sweep(t0() + Duration::minutes(25))
        .await
        .unwrap();
    assert!(second.escalated.is_empty());
    assert_eq!(second.skipped_cooldown, 1);

    let third = governor
        .run_escalation_sweep(t0() + Duration::minutes(28))
        .await
        .unwrap();
    assert_eq!(third.escalated.len(), 1);
}

/// Test: low severities are never escalated by the sweep
#[tokio::test]
async fn test_ineligible_severity_is_ignored() {
    let governor = governor();
    governor
        .register_alert(AlertRecord::new("info-1", "batch", Severity::Info, t0()))
        .unwrap();

    let report = governor
        .run_escalation_sweep(t0() + Duration::days(1))
        .await
        .unwrap();
    assert_eq!(report.scanned, 0);
    assert!(report.escalated.is_empty());
}

/// Test: ack is idempotent and unknown alerts are a distinct error
#[test]
fn test_ack_idempotent_and_not_found() {
    let governor = governor();
    governor
        .register_alert(AlertRecord::new("a1", "api-5xx", Severity::High, t0()))
        .unwrap();

    let first = governor
        .ack_alert_at("a1", "oncall", None, t0() + Duration::minutes(3))
        .unwrap();
    assert!(!first.already_acked);

    let again = governor
        .ack_alert_at("a1", "someone-else", None, t0() + Duration::minutes(9))
        .unwrap();
    assert!(again.already_acked);
    assert_eq!(again.acknowledged_at, first.acknowledged_at);

    assert!(matches!(
        governor.ack_alert("ghost", "oncall", None),
        Err(GovernanceError::NotFound { .. })
    ));
}

/// Test: unack reports whether anything changed
#[test]
fn test_unack_reports_change() {
    let governor = governor();
    governor
        .register_alert(AlertRecord::new("a1", "api-5xx", Severity::High, t0()))
        .unwrap();

    assert!(!governor.unack_alert("a1").unwrap().changed);
    governor.ack_alert("a1", "oncall", None).unwrap();
    assert!(governor.unack_alert("a1").unwrap().changed);
    assert!(!governor.unack_alert("a1").unwrap().changed);
}

/// Test: ack after escalation feeds latency into the escalation metrics
#[tokio::test]
async fn test_ack_latency_feeds_metrics() {
    let governor = governor();
    governor
        .register_alert(AlertRecord::new("a1", "api-5xx", Severity::High, t0()))
        .unwrap();

    let escalated_at = t0() + Duration::minutes(20);
    governor.run_escalation_sweep(escalated_at).await.unwrap();
    // 1 min after escalation: effective, and under 0.2 · 15 min
    governor
        .ack_alert_at("a1", "oncall", None, escalated_at + Duration::minutes(1))
        .unwrap();

    let metrics = governor
        .escalation_metrics_at(3_600_000, escalated_at + Duration::minutes(2))
        .unwrap();
    assert_eq!(metrics.total, 1);
    assert_eq!(metrics.acked, 1);
    assert_eq!(metrics.effectiveness, 1.0);
    assert_eq!(metrics.suspected_false_fraction, 1.0);
    assert_eq!(metrics.mean_ack_latency_ms, Some(60_000.0));

    // Acked alerts drop out of later sweeps.
    let later = governor
        .run_escalation_sweep(escalated_at + Duration::hours(2))
        .await
        .unwrap();
    assert_eq!(later.scanned, 0);
}

/// Test: an ack recorded first makes a manual escalation fail
#[test]
fn test_ack_before_override_rejects_override() {
    let governor = governor();
    governor
        .register_alert(AlertRecord::new("a1", "api-5xx", Severity::Medium, Utc::now()))
        .unwrap();
    governor.ack_alert("a1", "oncall", None).unwrap();

    assert!(matches!(
        governor.force_escalate("a1", "lead"),
        Err(GovernanceError::AlreadyAcknowledged { .. })
    ));
}

/// Test: a manual escalation recorded first gets its latency from the ack
#[test]
fn test_override_before_ack_records_latency() {
    let governor = governor();
    governor
        .register_alert(AlertRecord::new("a1", "api-5xx", Severity::Low, Utc::now()))
        .unwrap();

    let record = governor.force_escalate("a1", "lead").unwrap();
    assert!(record.ack_latency_ms.is_none());
    assert_eq!(record.actor.as_deref(), Some("lead"));

    governor.ack_alert("a1", "oncall", None).unwrap();
    let metrics = governor.escalation_metrics(3_600_000).unwrap();
    assert_eq!(metrics.total, 1);
    assert_eq!(metrics.acked, 1);
}

/// In-memory store whose first `failures` latency writes fail.
struct FlakyLatencyStore {
    inner: InMemoryAlertStore,
    failures: AtomicUsize,
}

impl AlertStore for FlakyLatencyStore {
    fn upsert_alert(&self, alert: AlertRecord) -> StoreResult<()> {
        self.inner.upsert_alert(alert)
    }

    fn get_alert(&self, alert_id: &str) -> StoreResult<Option<AlertRecord>> {
        self.inner.get_alert(alert_id)
    }

    fn list_alerts(&self) -> StoreResult<Vec<AlertRecord>> {
        self.inner.list_alerts()
    }

    fn get_ack(&self, alert_id: &str) -> StoreResult<Option<AckRecord>> {
        self.inner.get_ack(alert_id)
    }

    fn insert_ack_if_absent(&self, ack: AckRecord) -> StoreResult<AckInsert> {
        self.inner.insert_ack_if_absent(ack)
    }

    fn remove_ack(&self, alert_id: &str) -> StoreResult<Option<AckRecord>> {
        self.inner.remove_ack(alert_id)
    }

    fn list_acks(&self) -> StoreResult<Vec<AckRecord>> {
        self.inner.list_acks()
    }

    fn append_escalation(&self, record: EscalationRecord) -> StoreResult<()> {
        self.inner.append_escalation(record)
    }

    fn escalations_for(&self, alert_id: &str) -> StoreResult<Vec<EscalationRecord>> {
        self.inner.escalations_for(alert_id)
    }

    fn list_escalations(&self) -> StoreResult<Vec<EscalationRecord>> {
        self.inner.list_escalations()
    }

    fn record_ack_latency(&self, escalation_id: &str, latency_ms: u64) -> StoreResult<bool> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Io(std::io::Error::other("transient")));
        }
        self.inner.record_ack_latency(escalation_id, latency_ms)
    }

    fn clear(&self) -> StoreResult<()> {
        self.inner.clear()
    }
}

/// Test: a latency write that fails on the first ack lands on the retry
#[tokio::test]
async fn test_ack_retry_recovers_latency_write() {
    let store = Arc::new(FlakyLatencyStore {
        inner: InMemoryAlertStore::new(),
        failures: AtomicUsize::new(1),
    });
    let governor = AlertGovernor::new(
        GovernanceConfig::default(),
        store.clone(),
        Arc::new(StaticSignalSource::new()),
    )
    .expect("default config is valid");
    governor
        .register_alert(AlertRecord::new("a1", "api-5xx", Severity::High, t0()))
        .unwrap();
    let sweep = governor
        .run_escalation_sweep(t0() + Duration::minutes(20))
        .await
        .unwrap();
    assert_eq!(sweep.escalated.len(), 1);

    let acked_at = t0() + Duration::minutes(21);
    assert!(governor.ack_alert_at("a1", "oncall", None, acked_at).is_err());
    assert!(store.get_ack("a1").unwrap().is_some());

    let retry = governor
        .ack_alert_at("a1", "oncall", None, t0() + Duration::minutes(30))
        .unwrap();
    assert!(retry.already_acked);
    assert_eq!(retry.acknowledged_at, acked_at);

    let records = store.list_escalations().unwrap();
    assert_eq!(records[0].ack_latency_ms, Some(60_000));

    // A third ack leaves the recorded latency alone.
    governor
        .ack_alert_at("a1", "oncall", None, t0() + Duration::minutes(50))
        .unwrap();
    assert_eq!(store.list_escalations().unwrap()[0].ack_latency_ms, Some(60_000));
}

/// Test: metrics windows wider than the clock range cover all history
#[tokio::test]
async fn test_escalation_metrics_with_unbounded_window() {
    let governor = governor();
    governor
        .register_alert(AlertRecord::new("a1", "api-5xx", Severity::High, t0()))
        .unwrap();
    governor
        .run_escalation_sweep(t0() + Duration::minutes(20))
        .await
        .unwrap();

    let now = t0() + Duration::minutes(21);
    for window in [i64::MAX as u64, u64::MAX] {
        let metrics = governor.escalation_metrics_at(window, now).unwrap();
        assert_eq!(metrics.total, 1);
    }
}
