//! Escalation manager
//!
//! Periodic sweep over unacknowledged alerts. An alert whose age reaches
//! the dynamic SLA threshold for its severity gets one escalation record;
//! the record's cooldown keeps later sweeps from escalating it again until
//! the window elapses.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::sla::{self, SlaThreshold};
use crate::config::EscalationConfig;
use crate::error::{GovernanceError, GovernanceResult};
use crate::signals::Severity;
use crate::clock;
use crate::stats;
use crate::store::{
    AckRecord, AlertRecord, EscalationReason, EscalationRecord, SharedAlertStore, StoreResult,
};

/// Counts from one sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Unacked alerts of an eligible severity
    pub scanned: usize,
    pub escalated: Vec<EscalationRecord>,
    pub skipped_cooldown: usize,
    pub below_threshold: usize,
}

/// Escalation outcomes within a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EscalationMetrics {
    pub total: usize,
    /// Escalations with a recorded ack latency
    pub acked: usize,
    /// Fraction acked within `effectiveness_window_factor · threshold`
    pub effectiveness: f64,
    /// Fraction acked within `suspected_false_factor · threshold`; a
    /// heuristic, not proof the escalation was unnecessary
    pub suspected_false_fraction: f64,
    pub mean_ack_latency_ms: Option<f64>,
}

pub struct EscalationManager {
    config: EscalationConfig,
    store: SharedAlertStore,
    /// Serializes escalation writes between the sweep and manual overrides.
    write_lock: Mutex<()>,
}

impl EscalationManager {
    /// `config` must already be validated.
    pub fn new(config: EscalationConfig, store: SharedAlertStore) -> Self {
        Self {
            config,
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &EscalationConfig {
        &self.config
    }

    /// Historical ack latency per severity, newest `max_latency_samples`.
    fn latency_samples(
        &self,
        alerts: &HashMap<String, AlertRecord>,
        acks: &[AckRecord],
    ) -> HashMap<Severity, Vec<f64>> {
        let mut by_severity: HashMap<Severity, Vec<(DateTime<Utc>, f64)>> = HashMap::new();
        for ack in acks {
            if let Some(alert) = alerts.get(&ack.alert_id) {
                let latency = (ack.acknowledged_at - alert.created_at)
                    .num_milliseconds()
                    .max(0) as f64;
                by_severity
                    .entry(alert.severity)
                    .or_default()
                    .push((ack.acknowledged_at, latency));
            }
        }
        by_severity
            .into_iter()
            .map(|(severity, mut samples)| {
                samples.sort_by_key(|(at, _)| *at);
                let skip = samples.len().saturating_sub(self.config.max_latency_samples);
                (severity, samples.into_iter().skip(skip).map(|(_, l)| l).collect())
            })
            .collect()
    }

    /// Threshold currently in effect for a severity, or `None` if the
    /// severity is not escalation-eligible.
    pub fn threshold_for(&self, severity: Severity) -> StoreResult<Option<SlaThreshold>> {
        let Some(base) = self.config.base_sla_ms.get(&severity).copied() else {
            return Ok(None);
        };
        let alerts = self.alert_map()?;
        let acks = self.store.list_acks()?;
        let samples = self.latency_samples(&alerts, &acks);
        let empty = Vec::new();
        let samples = samples.get(&severity).unwrap_or(&empty);
        Ok(Some(sla::dynamic_threshold(
            base,
            samples,
            self.config.n_min_samples,
        )))
    }

    fn alert_map(&self) -> StoreResult<HashMap<String, AlertRecord>> {
        Ok(self
            .store
            .list_alerts()?
            .into_iter()
            .map(|a| (a.alert_id.clone(), a))
            .collect())
    }

    fn latest_cooldowns(&self) -> StoreResult<HashMap<String, DateTime<Utc>>> {
        let mut latest: HashMap<String, DateTime<Utc>> = HashMap::new();
        for record in self.store.list_escalations()? {
            let slot = latest.entry(record.alert_id.clone()).or_insert(record.cooldown_until);
            if record.cooldown_until > *slot {
                *slot = record.cooldown_until;
            }
        }
        Ok(latest)
    }

    /// Escalate every eligible unacked alert past its threshold.
    pub fn sweep(&self, now: DateTime<Utc>) -> StoreResult<SweepReport> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let alerts = self.alert_map()?;
        let acks = self.store.list_acks()?;
        let acked: std::collections::HashSet<&str> =
            acks.iter().map(|a| a.alert_id.as_str()).collect();
        let samples = self.latency_samples(&alerts, &acks);
        let cooldowns = self.latest_cooldowns()?;

        let mut thresholds: HashMap<Severity, SlaThreshold> = HashMap::new();
        for (severity, base) in &self.config.base_sla_ms {
            let s = samples.get(severity).map(Vec::as_slice).unwrap_or(&[]);
            thresholds.insert(
                *severity,
                sla::dynamic_threshold(*base, s, self.config.n_min_samples),
            );
        }

        let mut ordered: Vec<&AlertRecord> = alerts.values().collect();
        ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.alert_id.cmp(&b.alert_id)));

        let mut report = SweepReport::default();
        for alert in ordered {
            if acked.contains(alert.alert_id.as_str()) {
                continue;
            }
            let Some(threshold) = thresholds.get(&alert.severity) else {
                continue;
            };
            report.scanned += 1;

            let age_ms = (now - alert.created_at).num_milliseconds().max(0) as u64;
            if age_ms < threshold.threshold_ms {
                report.below_threshold += 1;
                continue;
            }
            if cooldowns
                .get(&alert.alert_id)
                .is_some_and(|until| *until > now)
            {
                report.skipped_cooldown += 1;
                continue;
            }

            let record = self.new_record(alert, threshold, now, EscalationReason::SlaBreach, None);
            self.store.append_escalation(record.clone())?;
            info!(
                alert_id = %alert.alert_id,
                severity = %alert.severity,
                age_ms,
                threshold_ms = threshold.threshold_ms,
                "Alert escalated"
            );
            report.escalated.push(record);
        }

        debug!(
            scanned = report.scanned,
            escalated = report.escalated.len(),
            skipped_cooldown = report.skipped_cooldown,
            below_threshold = report.below_threshold,
            "Escalation sweep complete"
        );
        Ok(report)
    }

    fn new_record(
        &self,
        alert: &AlertRecord,
        threshold: &SlaThreshold,
        now: DateTime<Utc>,
        reason: EscalationReason,
        actor: Option<String>,
    ) -> EscalationRecord {
        let cooldown = sla::cooldown_ms(
            threshold.threshold_ms,
            self.config.cooldown_min_ms,
            self.config.cooldown_max_ms,
        );
        EscalationRecord {
            id: EscalationRecord::new_id(),
            alert_id: alert.alert_id.clone(),
            alert_created_at: alert.created_at,
            severity: alert.severity,
            escalated_at: now,
            reason,
            threshold_ms: threshold.threshold_ms,
            age_ms: (now - alert.created_at).num_milliseconds().max(0) as u64,
            cooldown_until: clock::after(now, cooldown),
            ack_latency_ms: None,
            actor,
        }
    }

    /// Operator escalation: ignores threshold and cooldown. Unknown and
    /// already acknowledged alerts are rejected.
    pub fn force_escalate(
        &self,
        alert_id: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> GovernanceResult<EscalationRecord> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let alert = self
            .store
            .get_alert(alert_id)?
            .ok_or_else(|| GovernanceError::NotFound {
                alert_id: alert_id.to_string(),
            })?;
        if self.store.get_ack(alert_id)?.is_some() {
            return Err(GovernanceError::AlreadyAcknowledged {
                alert_id: alert_id.to_string(),
            });
        }

        // Ineligible severities have no SLA; the cooldown floor stands in.
        let base = self
            .config
            .base_sla_ms
            .get(&alert.severity)
            .copied()
            .unwrap_or(self.config.cooldown_min_ms);
        let alerts = self.alert_map()?;
        let acks = self.store.list_acks()?;
        let samples = self.latency_samples(&alerts, &acks);
        let s = samples.get(&alert.severity).map(Vec::as_slice).unwrap_or(&[]);
        let threshold = sla::dynamic_threshold(base, s, self.config.n_min_samples);

        let record = self.new_record(
            &alert,
            &threshold,
            now,
            EscalationReason::Manual,
            Some(actor.to_string()),
        );
        self.store.append_escalation(record.clone())?;
        info!(alert_id, actor, "Alert escalated manually");
        Ok(record)
    }

    /// Write ack-after-escalation latency on every escalation of the alert
    /// still lacking one. Returns `(escalation id, latency)` for each write.
    pub fn on_ack(
        &self,
        alert_id: &str,
        acked_at: DateTime<Utc>,
    ) -> StoreResult<Vec<(String, u64)>> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut written = Vec::new();
        for record in self.store.escalations_for(alert_id)? {
            if record.ack_latency_ms.is_some() {
                continue;
            }
            let latency = (acked_at - record.escalated_at).num_milliseconds().max(0) as u64;
            if self.store.record_ack_latency(&record.id, latency)? {
                debug!(alert_id, escalation_id = %record.id, latency_ms = latency, "Ack latency recorded");
                written.push((record.id, latency));
            }
        }
        Ok(written)
    }

    /// Escalation outcomes for records escalated within the window.
    pub fn metrics(&self, window_ms: u64, now: DateTime<Utc>) -> StoreResult<EscalationMetrics> {
        let since = clock::window_start(now, window_ms);
        let records: Vec<EscalationRecord> = self
            .store
            .list_escalations()?
            .into_iter()
            .filter(|r| r.escalated_at >= since && r.escalated_at <= now)
            .collect();

        let total = records.len();
        if total == 0 {
            return Ok(EscalationMetrics::default());
        }

        let mut latencies = Vec::new();
        let mut effective = 0usize;
        let mut suspected = 0usize;
        for record in &records {
            let Some(latency) = record.ack_latency_ms else {
                continue;
            };
            let latency = latency as f64;
            let threshold = record.threshold_ms as f64;
            latencies.push(latency);
            if latency <= self.config.effectiveness_window_factor * threshold {
                effective += 1;
            }
            if latency < self.config.suspected_false_factor * threshold {
                suspected += 1;
            }
        }

        Ok(EscalationMetrics {
            total,
            acked: latencies.len(),
            effectiveness: effective as f64 / total as f64,
            suspected_false_fraction: suspected as f64 / total as f64,
            mean_ack_latency_ms: stats::mean(&latencies),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::store::{AlertStore, InMemoryAlertStore};
    use std::sync::Arc;

    fn setup() -> (EscalationManager, Arc<InMemoryAlertStore>, DateTime<Utc>) {
        let store = Arc::new(InMemoryAlertStore::new());
        let manager = EscalationManager::new(EscalationConfig::default(), store.clone());
        (manager, store, Utc::now())
    }

    #[test]
    fn test_sweep_escalates_once_within_cooldown() {
        let (manager, store, now) = setup();
        store
            .upsert_alert(AlertRecord::new(
                "a1",
                "db",
                Severity::Critical,
                now - Duration::minutes(6),
            ))
            .unwrap();

        let first = manager.sweep(now).unwrap();
        assert_eq!(first.escalated.len(), 1);
        assert_eq!(first.escalated[0].threshold_ms, 300_000);

        let second = manager.sweep(now + Duration::minutes(1)).unwrap();
        assert!(second.escalated.is_empty());
        assert_eq!(second.skipped_cooldown, 1);
        assert_eq!(store.escalations_for("a1").unwrap().len(), 1);

        // cooldown = clamp(150s, 300s, 3600s) = 300s
        let third = manager.sweep(now + Duration::minutes(6)).unwrap();
        assert_eq!(third.escalated.len(), 1);
    }

    #[test]
    fn test_sweep_ignores_acked_young_and_ineligible() {
        let (manager, store, now) = setup();
        store
            .upsert_alert(AlertRecord::new("young", "g", Severity::High, now - Duration::minutes(1)))
            .unwrap();
        store
            .upsert_alert(AlertRecord::new("info", "g", Severity::Info, now - Duration::hours(5)))
            .unwrap();
        store
            .upsert_alert(AlertRecord::new("acked", "g", Severity::High, now - Duration::hours(5)))
            .unwrap();
        store
            .insert_ack_if_absent(AckRecord {
                alert_id: "acked".into(),
                acknowledged_at: now,
                actor: "alice".into(),
                note: None,
            })
            .unwrap();

        let report = manager.sweep(now).unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.below_threshold, 1);
        assert!(report.escalated.is_empty());
    }

    #[test]
    fn test_force_escalate_rules() {
        let (manager, store, now) = setup();
        store
            .upsert_alert(AlertRecord::new("a1", "g", Severity::Low, now))
            .unwrap();

        let record = manager.force_escalate("a1", "oncall", now).unwrap();
        assert_eq!(record.reason, EscalationReason::Manual);
        assert_eq!(record.actor.as_deref(), Some("oncall"));

        assert!(matches!(
            manager.force_escalate("ghost", "oncall", now),
            Err(GovernanceError::NotFound { .. })
        ));

        store
            .insert_ack_if_absent(AckRecord {
                alert_id: "a1".into(),
                acknowledged_at: now,
                actor: "alice".into(),
                note: None,
            })
            .unwrap();
        assert!(matches!(
            manager.force_escalate("a1", "oncall", now),
            Err(GovernanceError::AlreadyAcknowledged { .. })
        ));
    }

    #[test]
    fn test_on_ack_writes_latency_once_and_feeds_metrics() {
        let (manager, store, now) = setup();
        store
            .upsert_alert(AlertRecord::new("a1", "g", Severity::Critical, now - Duration::minutes(10)))
            .unwrap();
        store
            .upsert_alert(AlertRecord::new("a2", "g", Severity::Critical, now - Duration::minutes(10)))
            .unwrap();
        manager.sweep(now).unwrap();

        // a1 acked 30s after escalation (< 0.2·threshold), a2 never acked
        let written = manager.on_ack("a1", now + Duration::seconds(30)).unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].1, 30_000);
        assert!(manager.on_ack("a1", now + Duration::minutes(9)).unwrap().is_empty());

        let m = manager.metrics(3_600_000, now + Duration::minutes(1)).unwrap();
        assert_eq!(m.total, 2);
        assert_eq!(m.acked, 1);
        assert_eq!(m.effectiveness, 0.5);
        assert_eq!(m.suspected_false_fraction, 0.5);
        assert_eq!(m.mean_ack_latency_ms, Some(30_000.0));
    }

    #[test]
    fn test_huge_window_covers_all_history() {
        let (manager, store, now) = setup();
        store
            .upsert_alert(AlertRecord::new("a1", "g", Severity::Critical, now - Duration::minutes(10)))
            .unwrap();
        manager.sweep(now).unwrap();

        for window in [i64::MAX as u64, u64::MAX] {
            let m = manager.metrics(window, now + Duration::minutes(1)).unwrap();
            assert_eq!(m.total, 1);
        }
    }

    #[test]
    fn test_threshold_grows_with_slow_history() {
        let (manager, store, now) = setup();
        for i in 0..20 {
            let id = format!("old-{i}");
            let created = now - Duration::hours(3);
            store
                .upsert_alert(AlertRecord::new(id.clone(), "g", Severity::Critical, created))
                .unwrap();
            store
                .insert_ack_if_absent(AckRecord {
                    alert_id: id,
                    acknowledged_at: created + Duration::minutes(20),
                    actor: "alice".into(),
                    note: None,
                })
                .unwrap();
        }
        let t = manager.threshold_for(Severity::Critical).unwrap().unwrap();
        // p75 = 1_200_000, guardband 240_000
        assert_eq!(t.threshold_ms, 1_440_000);
        assert!(manager.threshold_for(Severity::Info).unwrap().is_none());
    }
}
