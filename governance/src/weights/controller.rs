//! Adaptive weight controller
//!
//! Discrete-time control loop over the scorer's weight vector. Each call to
//! [`AdaptiveWeightController::compute_adjustment`] is one cycle:
//!
//! ```text
//! metrics ──► errors (deadband) ──► outlier skip ──► convergence / freeze
//!                                                        │
//!          weights ◄── normalize ◄── drift cap ◄── routing ◄── cooldown
//! ```
//!
//! The controller is the single writer of [`SharedWeights`]; every decision,
//! including no-ops, is appended to the audit log.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::vector::{SharedWeights, WeightOverride, WeightVector, WEIGHT_COUNT};
use crate::config::AdaptiveWeightConfig;
use crate::metrics::{MetricKind, MetricsSnapshot, METRIC_COUNT};
use crate::stats;

/// Prior snapshots needed before outlier rejection applies.
pub const OUTLIER_MIN_SAMPLES: usize = 5;

/// MAD floor for outlier rejection; the deadband raises it further.
pub const OUTLIER_MAD_EPSILON: f64 = 1e-3;

/// In-memory audit entries kept by the controller.
pub const AUDIT_LOG_CAPACITY: usize = 1_000;

/// Why a cycle did or did not change the weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    Applied,
    /// Applied during cooldown because an error exceeded the severe threshold
    SevereOverride,
    Cooldown,
    /// Every error sat inside the deadband
    Deadband,
    /// Every non-zero error came from a metric rejected as an outlier
    OutlierSkip,
    Freeze,
    /// Operator `set_weights`
    Override,
}

impl std::fmt::Display for AdjustmentReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Applied => write!(f, "applied"),
            Self::SevereOverride => write!(f, "severe_override"),
            Self::Cooldown => write!(f, "cooldown"),
            Self::Deadband => write!(f, "deadband"),
            Self::OutlierSkip => write!(f, "outlier_skip"),
            Self::Freeze => write!(f, "freeze"),
            Self::Override => write!(f, "override"),
        }
    }
}

/// Direction-normalized errors; positive means worse than target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricErrors {
    pub ack_rate: f64,
    pub escalation_effectiveness: f64,
    pub false_suppression_rate: f64,
    pub suspected_false_rate: f64,
    pub re_noise_rate: f64,
}

impl MetricErrors {
    pub fn get(&self, kind: MetricKind) -> f64 {
        self.as_array()[kind.index()]
    }

    pub fn as_array(&self) -> [f64; METRIC_COUNT] {
        [
            self.ack_rate,
            self.escalation_effectiveness,
            self.false_suppression_rate,
            self.suspected_false_rate,
            self.re_noise_rate,
        ]
    }

    fn from_array(a: [f64; METRIC_COUNT]) -> Self {
        Self {
            ack_rate: a[0],
            escalation_effectiveness: a[1],
            false_suppression_rate: a[2],
            suspected_false_rate: a[3],
            re_noise_rate: a[4],
        }
    }

    pub fn mean_abs(&self) -> f64 {
        self.as_array().iter().map(|e| e.abs()).sum::<f64>() / METRIC_COUNT as f64
    }

    pub fn max_abs(&self) -> f64 {
        self.as_array().iter().fold(0.0, |m, e| m.max(e.abs()))
    }

    pub fn is_zero(&self) -> bool {
        self.as_array().iter().all(|e| *e == 0.0)
    }
}

/// One cycle's metrics and errors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControllerHistoryEntry {
    pub metrics: MetricsSnapshot,
    pub errors: MetricErrors,
}

/// Result of one controller decision; also the audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentOutcome {
    pub adjusted: bool,
    pub weights: WeightVector,
    pub previous_weights: WeightVector,
    pub errors: MetricErrors,
    pub deltas: [f64; WEIGHT_COUNT],
    pub reason: AdjustmentReason,
    #[serde(default)]
    pub skipped_metrics: Vec<MetricKind>,
    pub cycle: u64,
    pub at: DateTime<Utc>,
}

/// Mutable controller state, persisted alongside the weights.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerState {
    pub cycle: u64,
    /// Cycle of the last non-zero weight change
    pub last_adjustment_cycle: Option<u64>,
    /// Cycle of the last severe-deviation override
    pub last_override_cycle: Option<u64>,
    pub frozen: bool,
    pub frozen_since_cycle: Option<u64>,
    pub history: VecDeque<ControllerHistoryEntry>,
    /// Consecutive cycles whose windowed mean |err| was under the threshold
    pub stable_cycles: u32,
    pub audit_log: VecDeque<AdjustmentOutcome>,
}

/// Weights plus controller state, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightsSnapshot {
    pub weights: WeightVector,
    pub controller: ControllerState,
    pub saved_at: DateTime<Utc>,
}

pub struct AdaptiveWeightController {
    config: AdaptiveWeightConfig,
    weights: SharedWeights,
    state: Mutex<ControllerState>,
}

impl AdaptiveWeightController {
    /// Create a controller seeded with `initial` (normalized to bounds).
    /// `config` must already be validated.
    pub fn new(config: AdaptiveWeightConfig, initial: WeightVector) -> Self {
        let start = initial.normalize_bounded(config.w_min, config.w_max);
        Self {
            config,
            weights: SharedWeights::new(start),
            state: Mutex::new(ControllerState::default()),
        }
    }

    pub fn config(&self) -> &AdaptiveWeightConfig {
        &self.config
    }

    /// Reader handle on the live weights.
    pub fn shared_weights(&self) -> SharedWeights {
        self.weights.clone()
    }

    pub fn weights(&self) -> WeightVector {
        self.weights.snapshot()
    }

    pub fn state(&self) -> ControllerState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> WeightsSnapshot {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        WeightsSnapshot {
            weights: self.weights.snapshot(),
            controller: state.clone(),
            saved_at: now,
        }
    }

    /// Adopt persisted weights and state.
    pub fn restore(&self, snapshot: WeightsSnapshot) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let weights = if snapshot.weights.is_valid(self.config.w_min, self.config.w_max) {
            snapshot.weights
        } else {
            snapshot
                .weights
                .normalize_bounded(self.config.w_min, self.config.w_max)
        };
        self.weights.store(weights);
        *state = snapshot.controller;
        info!(cycle = state.cycle, frozen = state.frozen, "Weight controller restored");
    }

    /// Back to the starting vector with a fresh state.
    pub fn reset(&self, initial: WeightVector) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.weights
            .store(initial.normalize_bounded(self.config.w_min, self.config.w_max));
        *state = ControllerState::default();
    }

    /// Direction-normalized, deadbanded errors for a snapshot.
    pub fn errors_for(&self, metrics: &MetricsSnapshot) -> MetricErrors {
        let mut errs = [0.0; METRIC_COUNT];
        for kind in MetricKind::all() {
            let value = metrics.get(kind);
            let err = if value.is_finite() {
                kind.direction() * (value - kind.target(&self.config.targets))
            } else {
                0.0
            };
            errs[kind.index()] = if err.abs() < self.config.deadband {
                0.0
            } else {
                err
            };
        }
        MetricErrors::from_array(errs)
    }

    /// Run one control cycle.
    pub fn compute_adjustment(
        &self,
        metrics: &MetricsSnapshot,
        now: DateTime<Utc>,
    ) -> AdjustmentOutcome {
        let cfg = &self.config;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.cycle += 1;
        let cycle = state.cycle;
        let current = self.weights.snapshot();

        let errors = self.errors_for(metrics);
        let skipped = outliers(&state.history, metrics, cfg.outlier_mad_k, cfg.deadband);

        state.history.push_back(ControllerHistoryEntry {
            metrics: *metrics,
            errors,
        });
        while state.history.len() > cfg.history_size {
            state.history.pop_front();
        }

        let converged = windowed_mean_abs(&state.history, cfg.convergence_window)
            < cfg.convergence_threshold;
        if converged {
            state.stable_cycles = state.stable_cycles.saturating_add(1);
        } else {
            state.stable_cycles = 0;
        }

        let no_op = |reason: AdjustmentReason, skipped: Vec<MetricKind>| AdjustmentOutcome {
            adjusted: false,
            weights: current,
            previous_weights: current,
            errors,
            deltas: [0.0; WEIGHT_COUNT],
            reason,
            skipped_metrics: skipped,
            cycle,
            at: now,
        };

        if state.frozen {
            let since = state.frozen_since_cycle.unwrap_or(cycle);
            if cycle.saturating_sub(since) < cfg.min_freeze_hold_cycles {
                return record(&mut state, no_op(AdjustmentReason::Freeze, skipped));
            }
            if converged {
                state.frozen_since_cycle = Some(cycle);
                debug!(cycle, "Controller still converged, freeze hold restarted");
                return record(&mut state, no_op(AdjustmentReason::Freeze, skipped));
            }
            info!(cycle, "Controller unfrozen, errors left the convergence band");
            state.frozen = false;
            state.frozen_since_cycle = None;
            state.stable_cycles = 0;
        } else if state.stable_cycles >= cfg.stable_freeze_cycles {
            state.frozen = true;
            state.frozen_since_cycle = Some(cycle);
            info!(cycle, weights = %current, "Controller converged, freezing weights");
            return record(&mut state, no_op(AdjustmentReason::Freeze, skipped));
        }

        let mut effective = errors.as_array();
        for kind in &skipped {
            effective[kind.index()] = 0.0;
        }
        let effective = MetricErrors::from_array(effective);
        if effective.is_zero() {
            let reason = if errors.is_zero() {
                AdjustmentReason::Deadband
            } else {
                AdjustmentReason::OutlierSkip
            };
            return record(&mut state, no_op(reason, skipped));
        }

        let mut reason = AdjustmentReason::Applied;
        let in_cooldown = state
            .last_adjustment_cycle
            .is_some_and(|last| cycle - last <= cfg.cooldown_cycles);
        if in_cooldown {
            let severe = effective.max_abs() > cfg.severe_deviation_threshold;
            let overrode_last_cycle = state.last_override_cycle == Some(cycle - 1);
            if !severe || overrode_last_cycle {
                return record(&mut state, no_op(AdjustmentReason::Cooldown, skipped));
            }
            reason = AdjustmentReason::SevereOverride;
            state.last_override_cycle = Some(cycle);
        }

        let deltas = route(&effective, &current, cfg);
        let next = current
            .with_deltas(&deltas)
            .normalize_bounded(cfg.w_min, cfg.w_max);
        let adjusted = next != current;
        if adjusted {
            self.weights.store(next);
            state.last_adjustment_cycle = Some(cycle);
        }
        info!(
            cycle,
            reason = %reason,
            weights = %next,
            drift = current.l1_distance(&next),
            "Weight adjustment"
        );

        record(
            &mut state,
            AdjustmentOutcome {
                adjusted,
                weights: next,
                previous_weights: current,
                errors,
                deltas,
                reason,
                skipped_metrics: skipped,
                cycle,
                at: now,
            },
        )
    }

    /// Operator override of any subset of components.
    pub fn set_weights(&self, partial: &WeightOverride, now: DateTime<Utc>) -> AdjustmentOutcome {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let current = self.weights.snapshot();
        let next = current.apply_override(partial, self.config.w_min, self.config.w_max);
        self.weights.store(next);
        info!(weights = %next, "Weights overridden");

        let mut deltas = [0.0; WEIGHT_COUNT];
        for (i, d) in deltas.iter_mut().enumerate() {
            *d = next.as_array()[i] - current.as_array()[i];
        }
        let cycle = state.cycle;
        record(
            &mut state,
            AdjustmentOutcome {
                adjusted: next != current,
                weights: next,
                previous_weights: current,
                errors: MetricErrors::default(),
                deltas,
                reason: AdjustmentReason::Override,
                skipped_metrics: Vec::new(),
                cycle,
                at: now,
            },
        )
    }

    pub fn audit_log(&self) -> Vec<AdjustmentOutcome> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.audit_log.iter().cloned().collect()
    }
}

fn record(state: &mut ControllerState, outcome: AdjustmentOutcome) -> AdjustmentOutcome {
    state.audit_log.push_back(outcome.clone());
    while state.audit_log.len() > AUDIT_LOG_CAPACITY {
        state.audit_log.pop_front();
    }
    outcome
}

/// Metrics whose value deviates from their history median by more than
/// `k · max(MAD, deadband, ε)` while the previous snapshot did not.
///
/// Only an isolated deviation is rejected. A shift that persists into a
/// second cycle is treated as real and feeds the adjustment.
fn outliers(
    history: &VecDeque<ControllerHistoryEntry>,
    metrics: &MetricsSnapshot,
    k: f64,
    deadband: f64,
) -> Vec<MetricKind> {
    if history.len() < OUTLIER_MIN_SAMPLES {
        return Vec::new();
    }
    let Some(previous) = history.back() else {
        return Vec::new();
    };
    MetricKind::all()
        .into_iter()
        .filter(|kind| {
            let values: Vec<f64> = history.iter().map(|h| h.metrics.get(*kind)).collect();
            let Some(median) = stats::median(&values) else {
                return false;
            };
            let spread = stats::mad(&values, median)
                .unwrap_or(0.0)
                .max(deadband)
                .max(OUTLIER_MAD_EPSILON);
            let deviates = |value: f64| (value - median).abs() > k * spread;
            deviates(metrics.get(*kind)) && !deviates(previous.metrics.get(*kind))
        })
        .collect()
}

fn windowed_mean_abs(history: &VecDeque<ControllerHistoryEntry>, window: usize) -> f64 {
    let recent: Vec<f64> = history
        .iter()
        .rev()
        .take(window)
        .map(|h| h.errors.mean_abs())
        .collect();
    stats::mean(&recent).unwrap_or(0.0)
}

/// Map errors to per-component deltas, clamp, then cap total drift.
fn route(
    errors: &MetricErrors,
    current: &WeightVector,
    cfg: &AdaptiveWeightConfig,
) -> [f64; WEIGHT_COUNT] {
    let gain = cfg.adjust_factor;
    let mut deltas = [0.0; WEIGHT_COUNT];

    deltas[0] += gain * errors.ack_rate;
    deltas[1] += gain * errors.suspected_false_rate;
    deltas[4] += gain * errors.escalation_effectiveness;

    // False suppressions shift weight off w2..w4 in proportion to their
    // share and onto w5.
    let fs = gain * errors.false_suppression_rate;
    if fs != 0.0 {
        let w = current.as_array();
        let share: f64 = w[1] + w[2] + w[3];
        if share > 0.0 {
            for i in 1..4 {
                deltas[i] -= fs * w[i] / share;
            }
            deltas[4] += fs;
        }
    }

    for d in deltas.iter_mut() {
        *d = d.clamp(-cfg.max_delta, cfg.max_delta);
    }
    let l1: f64 = deltas.iter().map(|d| d.abs()).sum();
    if l1 > cfg.max_cycle_drift {
        let scale = cfg.max_cycle_drift / l1;
        for d in deltas.iter_mut() {
            *d *= scale;
        }
    }
    deltas
}
