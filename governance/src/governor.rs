//! Alert governor facade
//!
//! Wires the subsystems together and is the only public entry point for
//! mutating governance state:
//!
//! ```text
//!            ┌─────────────┐  signals   ┌──────────────────┐
//!            │ SignalSource│───────────▶│ SuppressionEngine │──┐ transitions
//!            └─────────────┘            └──────────────────┘  │
//!                                          ▲ weights          ▼
//! ┌──────────────────┐ snapshot ┌──────────┴─────────┐  ┌──────────────┐
//! │MetricsAggregator │─────────▶│WeightController    │  │  Event Bus   │
//! └──────────────────┘          └────────────────────┘  └──────────────┘
//!          ▲ effectiveness                                    ▲
//! ┌────────┴─────────┐   acks   ┌────────────┐                │
//! │EscalationManager │◀────────│ AckLedger  │────────────────┘
//! └──────────────────┘          └────────────┘
//! ```
//!
//! Acks, manual escalations and escalation sweeps are serialized through
//! one lock: an ack recorded before an override makes the override fail
//! with `AlreadyAcknowledged`, and an override recorded before an ack gets
//! its latency written by that ack.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ack::{AckLedger, AckOutcome, UnackOutcome};
use crate::config::{GovernanceConfig, SuppressionConfig};
use crate::error::GovernanceResult;
use crate::escalation::{EscalationManager, EscalationMetrics, SweepReport};
use crate::events::{
    EventBus, EventFilter, EventHandler, FilteredReceiver, GovernanceEvent, SharedEventBus,
};
use crate::metrics::{MetricsAggregator, MetricsSnapshot};
use crate::persistence::{PersistenceError, PersistenceResult, SharedPersistenceGateway};
use crate::scheduler::{spawn_periodic, SweepGate, SweepTask};
use crate::signals::{SignalError, SignalSource};
use crate::store::{AlertRecord, EscalationRecord, SharedAlertStore};
use crate::suppression::{
    BatchResult, GroupEvaluation, GroupId, GroupRuntimeState, SuppressionEngine, TransitionRecord,
};
use crate::weights::{
    AdaptiveWeightController, AdjustmentOutcome, ControllerState, WeightOverride, WeightVector,
};

/// What [`AlertGovernor::restore`] picked up from the gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreReport {
    pub weights_restored: bool,
    pub groups_restored: usize,
}

pub struct AlertGovernor {
    config: GovernanceConfig,
    suppression: SuppressionEngine,
    controller: AdaptiveWeightController,
    metrics: MetricsAggregator,
    escalation: EscalationManager,
    ledger: AckLedger,
    store: SharedAlertStore,
    signals: Arc<dyn SignalSource>,
    gateway: Option<SharedPersistenceGateway>,
    bus: SharedEventBus,
    /// Serializes acks, overrides and escalation sweeps
    ack_lock: Mutex<()>,
}

impl AlertGovernor {
    /// Build a governor. Fails fast on an inconsistent config.
    pub fn new(
        config: GovernanceConfig,
        store: SharedAlertStore,
        signals: Arc<dyn SignalSource>,
    ) -> GovernanceResult<Self> {
        config.validate()?;

        let initial = config
            .weights
            .starting_weights(&config.suppression.weights);
        let signal_timeout = Duration::from_millis(config.scheduler.signal_timeout_ms);

        Ok(Self {
            suppression: SuppressionEngine::new(config.suppression.clone(), signal_timeout),
            controller: AdaptiveWeightController::new(config.weights.clone(), initial),
            metrics: MetricsAggregator::new(),
            escalation: EscalationManager::new(config.escalation.clone(), store.clone()),
            ledger: AckLedger::new(store.clone()),
            store,
            signals,
            gateway: None,
            bus: EventBus::new().shared(),
            ack_lock: Mutex::new(()),
            config,
        })
    }

    /// Attach a persistence gateway.
    pub fn with_gateway(mut self, gateway: SharedPersistenceGateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Publish on an existing bus instead of a private one.
    pub fn with_event_bus(mut self, bus: SharedEventBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    fn initial_weights(&self) -> WeightVector {
        self.config
            .weights
            .starting_weights(&self.config.suppression.weights)
    }

    // ========================================================================
    // Suppression
    // ========================================================================

    /// Evaluate one suppression window for `group_ids`.
    pub async fn evaluate_suppression_window(&self, group_ids: &[GroupId]) -> BatchResult {
        self.evaluate_suppression_window_at(group_ids, Utc::now())
            .await
    }

    pub async fn evaluate_suppression_window_at(
        &self,
        group_ids: &[GroupId],
        now: DateTime<Utc>,
    ) -> BatchResult {
        let weights = self.controller.weights();
        let batch = self
            .suppression
            .evaluate_window(self.signals.as_ref(), group_ids, &weights, now)
            .await;
        self.metrics.record_batch(&batch, now);

        for result in &batch.results {
            match result {
                GroupEvaluation::Skipped { group_id, reason } => {
                    self.bus.publish(GovernanceEvent::GroupSkipped {
                        group_id: group_id.clone(),
                        reason: reason.clone(),
                        timestamp: now,
                    });
                }
                GroupEvaluation::Evaluated {
                    group_id,
                    exit_verdict: Some(verdict),
                    ..
                } if verdict.suspected_false => {
                    warn!(
                        group_id = %group_id,
                        during = verdict.mean_ack_during,
                        after = verdict.mean_ack_after,
                        "Suspected false suppression"
                    );
                    self.bus.publish(GovernanceEvent::FalseSuppressionSuspected {
                        group_id: group_id.clone(),
                        verdict: *verdict,
                        timestamp: now,
                    });
                }
                GroupEvaluation::Evaluated { .. } => {}
            }
        }

        for record in &batch.transitions {
            self.bus.publish(GovernanceEvent::SuppressionTransition {
                record: record.clone(),
            });
            if let Some(gateway) = &self.gateway {
                self.persist("append_transition_audit", gateway.append_transition_audit(record))
                    .await;
            }
        }
        if !batch.transitions.is_empty() {
            self.save_suppression_snapshots().await;
        }

        debug!(
            evaluated = batch.evaluated(),
            skipped = batch.skipped(),
            transitions = batch.transitions.len(),
            "Suppression window complete"
        );
        batch
    }

    /// Evaluate every group the signal source reports as active.
    pub async fn run_suppression_sweep(&self, now: DateTime<Utc>) -> GovernanceResult<BatchResult> {
        let timeout = Duration::from_millis(self.config.scheduler.signal_timeout_ms);
        let groups = match tokio::time::timeout(timeout, self.signals.active_groups()).await {
            Ok(groups) => groups?,
            Err(_) => {
                return Err(SignalError::Timeout(self.config.scheduler.signal_timeout_ms).into())
            }
        };
        Ok(self.evaluate_suppression_window_at(&groups, now).await)
    }

    pub fn suppression_state(&self, group_id: &str) -> Option<GroupRuntimeState> {
        self.suppression.state(group_id)
    }

    pub fn suppression_states(&self) -> Vec<GroupRuntimeState> {
        self.suppression.snapshots()
    }

    pub fn transition_log(&self) -> Vec<TransitionRecord> {
        self.suppression.transition_log()
    }

    /// Validate and swap the suppression config; applies from the next window.
    pub fn reload_suppression_config(&self, config: SuppressionConfig) -> GovernanceResult<()> {
        self.suppression.reload(config)?;
        Ok(())
    }

    // ========================================================================
    // Weights
    // ========================================================================

    pub fn weights(&self) -> WeightVector {
        self.controller.weights()
    }

    pub fn controller_state(&self) -> ControllerState {
        self.controller.state()
    }

    pub fn weight_audit_log(&self) -> Vec<AdjustmentOutcome> {
        self.controller.audit_log()
    }

    /// Operator override of any subset of weight components.
    pub async fn set_weights(&self, partial: &WeightOverride) -> AdjustmentOutcome {
        let outcome = self.controller.set_weights(partial, Utc::now());
        self.after_weight_decision(&outcome).await;
        outcome
    }

    /// Run one controller cycle on an explicit metrics snapshot.
    pub async fn compute_adjustment(&self, metrics: &MetricsSnapshot) -> AdjustmentOutcome {
        self.compute_adjustment_at(metrics, Utc::now()).await
    }

    pub async fn compute_adjustment_at(
        &self,
        metrics: &MetricsSnapshot,
        now: DateTime<Utc>,
    ) -> AdjustmentOutcome {
        let outcome = self.controller.compute_adjustment(metrics, now);
        self.after_weight_decision(&outcome).await;
        outcome
    }

    /// Current metrics over the configured window.
    pub fn metrics_snapshot(&self, now: DateTime<Utc>) -> GovernanceResult<MetricsSnapshot> {
        let window_ms = self.config.scheduler.metrics_window_ms;
        let escalation = self.escalation.metrics(window_ms, now)?;
        Ok(self
            .metrics
            .snapshot(window_ms, now, &self.config.weights.targets, Some(&escalation)))
    }

    /// Aggregate the metrics window and feed it to the controller.
    pub async fn run_tuning_cycle(&self, now: DateTime<Utc>) -> GovernanceResult<AdjustmentOutcome> {
        let snapshot = self.metrics_snapshot(now)?;
        debug!(
            ack_rate = snapshot.ack_rate,
            effectiveness = snapshot.escalation_effectiveness,
            false_suppression = snapshot.false_suppression_rate,
            "Tuning cycle metrics"
        );
        Ok(self.compute_adjustment_at(&snapshot, now).await)
    }

    async fn after_weight_decision(&self, outcome: &AdjustmentOutcome) {
        self.bus.publish(GovernanceEvent::WeightDecision {
            outcome: outcome.clone(),
        });
        if let Some(gateway) = &self.gateway {
            self.persist("append_weight_audit", gateway.append_weight_audit(outcome))
                .await;
            let snapshot = self.controller.snapshot(outcome.at);
            self.persist("save_weights_snapshot", gateway.save_weights_snapshot(&snapshot))
                .await;
        }
    }

    // ========================================================================
    // Alerts, acks and escalation
    // ========================================================================

    /// Make an alert known to the governor (insert or replace).
    pub fn register_alert(&self, alert: AlertRecord) -> GovernanceResult<()> {
        debug!(alert_id = %alert.alert_id, severity = %alert.severity, "Alert registered");
        self.store.upsert_alert(alert)?;
        Ok(())
    }

    pub async fn run_escalation_sweep(&self, now: DateTime<Utc>) -> GovernanceResult<SweepReport> {
        let report = {
            let _guard = self.ack_lock.lock().unwrap_or_else(|e| e.into_inner());
            self.escalation.sweep(now)?
        };
        for record in &report.escalated {
            self.bus.publish(GovernanceEvent::AlertEscalated {
                record: record.clone(),
            });
        }
        Ok(report)
    }

    /// Escalate an unacknowledged alert now, ignoring threshold and cooldown.
    pub fn force_escalate(&self, alert_id: &str, actor: &str) -> GovernanceResult<EscalationRecord> {
        let record = {
            let _guard = self.ack_lock.lock().unwrap_or_else(|e| e.into_inner());
            self.escalation.force_escalate(alert_id, actor, Utc::now())?
        };
        self.bus.publish(GovernanceEvent::AlertEscalated {
            record: record.clone(),
        });
        Ok(record)
    }

    pub fn escalation_metrics(&self, window_ms: u64) -> GovernanceResult<EscalationMetrics> {
        self.escalation_metrics_at(window_ms, Utc::now())
    }

    pub fn escalation_metrics_at(
        &self,
        window_ms: u64,
        now: DateTime<Utc>,
    ) -> GovernanceResult<EscalationMetrics> {
        Ok(self.escalation.metrics(window_ms, now)?)
    }

    /// Acknowledge an alert. Repeats succeed with `already_acked`.
    pub fn ack_alert(
        &self,
        alert_id: &str,
        actor: &str,
        note: Option<String>,
    ) -> GovernanceResult<AckOutcome> {
        self.ack_alert_at(alert_id, actor, note, Utc::now())
    }

    pub fn ack_alert_at(
        &self,
        alert_id: &str,
        actor: &str,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> GovernanceResult<AckOutcome> {
        let (outcome, inserted) = {
            let _guard = self.ack_lock.lock().unwrap_or_else(|e| e.into_inner());
            let (outcome, inserted) = self.ledger.ack(alert_id, actor, note, now)?;
            // Repeats retry the write-back too; already-recorded latencies stay.
            self.escalation.on_ack(alert_id, outcome.acknowledged_at)?;
            (outcome, inserted)
        };
        if let Some(record) = inserted {
            self.bus.publish(GovernanceEvent::AlertAcknowledged {
                alert_id: record.alert_id,
                actor: record.actor,
                timestamp: record.acknowledged_at,
            });
        }
        Ok(outcome)
    }

    pub fn unack_alert(&self, alert_id: &str) -> GovernanceResult<UnackOutcome> {
        let outcome = {
            let _guard = self.ack_lock.lock().unwrap_or_else(|e| e.into_inner());
            self.ledger.unack(alert_id)?
        };
        if outcome.changed {
            self.bus.publish(GovernanceEvent::AlertUnacknowledged {
                alert_id: alert_id.to_string(),
                timestamp: Utc::now(),
            });
        }
        Ok(outcome)
    }

    // ========================================================================
    // Events
    // ========================================================================

    pub fn event_bus(&self) -> SharedEventBus {
        self.bus.clone()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<GovernanceEvent> {
        self.bus.subscribe()
    }

    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        self.bus.subscribe_filtered(filter)
    }

    /// Handlers run in registration order on every event.
    pub fn register_handler(&self, handler: Arc<dyn EventHandler>) {
        self.bus.register_handler(handler);
    }

    // ========================================================================
    // Persistence and lifecycle
    // ========================================================================

    /// Load the latest weight and suppression snapshots. A failed load is
    /// logged and leaves the configured defaults in place.
    pub async fn restore(&self) -> RestoreReport {
        let mut report = RestoreReport::default();
        let Some(gateway) = self.gateway.clone() else {
            return report;
        };

        match self
            .bounded("load_latest_weights", gateway.load_latest_weights())
            .await
        {
            Ok(Some(snapshot)) => {
                self.controller.restore(snapshot);
                report.weights_restored = true;
            }
            Ok(None) => debug!("No persisted weights, using configured defaults"),
            Err(e) => self.persistence_failed("load_latest_weights", &e),
        }

        match self
            .bounded("load_suppression_snapshots", gateway.load_suppression_snapshots())
            .await
        {
            Ok(snapshots) => report.groups_restored = self.suppression.hydrate(snapshots),
            Err(e) => self.persistence_failed("load_suppression_snapshots", &e),
        }

        info!(
            weights_restored = report.weights_restored,
            groups_restored = report.groups_restored,
            "Governor state restored"
        );
        report
    }

    /// Write weight and suppression snapshots. Returns whether both landed.
    pub async fn save_snapshots(&self) -> bool {
        let Some(gateway) = &self.gateway else {
            return true;
        };
        let snapshot = self.controller.snapshot(Utc::now());
        let weights_ok = self
            .persist("save_weights_snapshot", gateway.save_weights_snapshot(&snapshot))
            .await;
        let groups_ok = self.save_suppression_snapshots().await;
        weights_ok && groups_ok
    }

    async fn save_suppression_snapshots(&self) -> bool {
        let Some(gateway) = &self.gateway else {
            return true;
        };
        let snapshots = self.suppression.snapshots();
        self.persist(
            "save_suppression_snapshots",
            gateway.save_suppression_snapshots(&snapshots),
        )
        .await
    }

    /// Clear all group state, weights, metrics and alert records.
    pub fn reset(&self) -> GovernanceResult<()> {
        let _guard = self.ack_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.suppression.reset();
        self.controller.reset(self.initial_weights());
        self.metrics.reset();
        self.store.clear()?;
        info!("Governor reset");
        Ok(())
    }

    async fn bounded<T, F>(&self, operation: &str, fut: F) -> PersistenceResult<T>
    where
        F: Future<Output = PersistenceResult<T>>,
    {
        let timeout_ms = self.config.scheduler.persistence_timeout_ms;
        match tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await {
            Ok(result) => result,
            Err(_) => Err(PersistenceError::Timeout {
                operation: operation.to_string(),
                timeout_ms,
            }),
        }
    }

    /// Best-effort write; failure is logged and published, never returned.
    async fn persist<F>(&self, operation: &str, fut: F) -> bool
    where
        F: Future<Output = PersistenceResult<()>>,
    {
        match self.bounded(operation, fut).await {
            Ok(()) => true,
            Err(e) => {
                self.persistence_failed(operation, &e);
                false
            }
        }
    }

    fn persistence_failed(&self, operation: &str, error: &PersistenceError) {
        warn!(operation, error = %error, "Persistence call failed, continuing in memory");
        self.bus.publish(GovernanceEvent::PersistenceFailed {
            operation: operation.to_string(),
            error: error.to_string(),
            timestamp: Utc::now(),
        });
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Start the suppression, tuning and escalation sweeps. They stop when
    /// `cancel` fires.
    pub fn spawn_sweeps(self: &Arc<Self>, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let scheduler = &self.config.scheduler;
        [
            (SweepKind::Suppression, scheduler.suppression_interval_ms),
            (SweepKind::Tuning, scheduler.tuning_interval_ms),
            (SweepKind::Escalation, self.config.escalation.run_interval_ms),
        ]
        .into_iter()
        .map(|(kind, period_ms)| {
            let task: Arc<dyn SweepTask> = Arc::new(GovernorSweep {
                governor: self.clone(),
                kind,
            });
            spawn_periodic(
                task,
                Duration::from_millis(period_ms),
                SweepGate::new(),
                cancel.clone(),
            )
        })
        .collect()
    }
}

/// Which periodic cycle a [`GovernorSweep`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepKind {
    Suppression,
    Tuning,
    Escalation,
}

/// Adapter that lets the scheduler drive one governor cycle.
pub struct GovernorSweep {
    governor: Arc<AlertGovernor>,
    kind: SweepKind,
}

impl GovernorSweep {
    pub fn new(governor: Arc<AlertGovernor>, kind: SweepKind) -> Self {
        Self { governor, kind }
    }
}

#[async_trait]
impl SweepTask for GovernorSweep {
    fn name(&self) -> &'static str {
        match self.kind {
            SweepKind::Suppression => "suppression",
            SweepKind::Tuning => "tuning",
            SweepKind::Escalation => "escalation",
        }
    }

    async fn run(&self) -> GovernanceResult<()> {
        let now = Utc::now();
        match self.kind {
            SweepKind::Suppression => {
                self.governor.run_suppression_sweep(now).await?;
            }
            SweepKind::Tuning => {
                self.governor.run_tuning_cycle(now).await?;
            }
            SweepKind::Escalation => {
                let report = self.governor.run_escalation_sweep(now).await?;
                if !report.escalated.is_empty() {
                    info!(escalated = report.escalated.len(), scanned = report.scanned, "Escalation sweep");
                }
            }
        }
        Ok(())
    }
}
