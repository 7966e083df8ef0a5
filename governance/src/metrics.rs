//! Metrics aggregator
//!
//! Collects timestamped suppression and signal events and reduces them to
//! the window-level SLA snapshot the weight controller consumes. A metric
//! with no samples in the window reports its target, so it contributes no
//! error.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SlaTargets;
use crate::escalation::EscalationMetrics;
use crate::clock;
use crate::stats;
use crate::suppression::{BatchResult, GroupEvaluation, GroupId, SuppressionState};

/// Events retained before the oldest are dropped.
pub const MAX_EVENTS: usize = 10_000;

/// Number of SLA metrics.
pub const METRIC_COUNT: usize = 5;

/// SLA metric identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    AckRate,
    EscalationEffectiveness,
    FalseSuppressionRate,
    SuspectedFalseRate,
    ReNoiseRate,
}

impl MetricKind {
    pub fn all() -> [MetricKind; METRIC_COUNT] {
        [
            Self::AckRate,
            Self::EscalationEffectiveness,
            Self::FalseSuppressionRate,
            Self::SuspectedFalseRate,
            Self::ReNoiseRate,
        ]
    }

    pub fn index(self) -> usize {
        match self {
            Self::AckRate => 0,
            Self::EscalationEffectiveness => 1,
            Self::FalseSuppressionRate => 2,
            Self::SuspectedFalseRate => 3,
            Self::ReNoiseRate => 4,
        }
    }

    /// −1 when higher is better, +1 when lower is better.
    pub fn direction(self) -> f64 {
        match self {
            Self::AckRate | Self::EscalationEffectiveness => -1.0,
            Self::FalseSuppressionRate | Self::SuspectedFalseRate | Self::ReNoiseRate => 1.0,
        }
    }

    pub fn target(self, targets: &SlaTargets) -> f64 {
        match self {
            Self::AckRate => targets.ack_rate,
            Self::EscalationEffectiveness => targets.escalation_effectiveness,
            Self::FalseSuppressionRate => targets.false_suppression_rate,
            Self::SuspectedFalseRate => targets.suspected_false_rate,
            Self::ReNoiseRate => targets.re_noise_rate,
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AckRate => write!(f, "ack_rate"),
            Self::EscalationEffectiveness => write!(f, "escalation_effectiveness"),
            Self::FalseSuppressionRate => write!(f, "false_suppression_rate"),
            Self::SuspectedFalseRate => write!(f, "suspected_false_rate"),
            Self::ReNoiseRate => write!(f, "re_noise_rate"),
        }
    }
}

/// Window-level SLA metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub ack_rate: f64,
    pub escalation_effectiveness: f64,
    pub false_suppression_rate: f64,
    pub suspected_false_rate: f64,
    pub re_noise_rate: f64,
}

impl MetricsSnapshot {
    /// Snapshot sitting exactly on target.
    pub fn on_target(targets: &SlaTargets) -> Self {
        Self {
            ack_rate: targets.ack_rate,
            escalation_effectiveness: targets.escalation_effectiveness,
            false_suppression_rate: targets.false_suppression_rate,
            suspected_false_rate: targets.suspected_false_rate,
            re_noise_rate: targets.re_noise_rate,
        }
    }

    pub fn get(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::AckRate => self.ack_rate,
            MetricKind::EscalationEffectiveness => self.escalation_effectiveness,
            MetricKind::FalseSuppressionRate => self.false_suppression_rate,
            MetricKind::SuspectedFalseRate => self.suspected_false_rate,
            MetricKind::ReNoiseRate => self.re_noise_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum MetricEvent {
    Signal {
        at: DateTime<Utc>,
        ack_rate: f64,
        suspected_false_rate: f64,
        escalation_effectiveness: f64,
    },
    SuppressionExit {
        at: DateTime<Utc>,
    },
    FalseSuppression {
        at: DateTime<Utc>,
        group_id: GroupId,
    },
    ReNoise {
        at: DateTime<Utc>,
    },
}

impl MetricEvent {
    fn at(&self) -> DateTime<Utc> {
        match self {
            Self::Signal { at, .. }
            | Self::SuppressionExit { at }
            | Self::FalseSuppression { at, .. }
            | Self::ReNoise { at } => *at,
        }
    }
}

/// Event counts within a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowCounts {
    pub signals: usize,
    pub suppression_exits: usize,
    pub false_suppressions: usize,
    pub re_noise: usize,
}

#[derive(Debug, Default)]
pub struct MetricsAggregator {
    events: Mutex<VecDeque<MetricEvent>>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: MetricEvent) {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.push_back(event);
        while events.len() > MAX_EVENTS {
            events.pop_front();
        }
    }

    /// Fold one suppression batch into the event stream.
    pub fn record_batch(&self, batch: &BatchResult, now: DateTime<Utc>) {
        for result in &batch.results {
            if let GroupEvaluation::Evaluated {
                group_id,
                signals,
                exit_verdict,
                re_noise,
                ..
            } = result
            {
                self.push(MetricEvent::Signal {
                    at: now,
                    ack_rate: signals.ack_rate,
                    suspected_false_rate: signals.suspected_false_rate,
                    escalation_effectiveness: signals.escalation_effectiveness,
                });
                if exit_verdict.is_some_and(|v| v.suspected_false) {
                    self.push(MetricEvent::FalseSuppression {
                        at: now,
                        group_id: group_id.clone(),
                    });
                }
                if *re_noise {
                    self.push(MetricEvent::ReNoise { at: now });
                }
            }
        }
        for transition in &batch.transitions {
            if transition.from == SuppressionState::Suppressed {
                self.push(MetricEvent::SuppressionExit { at: transition.at });
            }
        }
    }

    pub fn counts(&self, window_ms: u64, now: DateTime<Utc>) -> WindowCounts {
        let since = clock::window_start(now, window_ms);
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        let mut counts = WindowCounts::default();
        for event in events.iter().filter(|e| e.at() >= since && e.at() <= now) {
            match event {
                MetricEvent::Signal { .. } => counts.signals += 1,
                MetricEvent::SuppressionExit { .. } => counts.suppression_exits += 1,
                MetricEvent::FalseSuppression { .. } => counts.false_suppressions += 1,
                MetricEvent::ReNoise { .. } => counts.re_noise += 1,
            }
        }
        counts
    }

    /// Groups with a suspected false suppression inside the window.
    pub fn false_suppression_groups(&self, window_ms: u64, now: DateTime<Utc>) -> Vec<GroupId> {
        let since = clock::window_start(now, window_ms);
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        let mut groups: Vec<GroupId> = events
            .iter()
            .filter_map(|e| match e {
                MetricEvent::FalseSuppression { at, group_id } if *at >= since => {
                    Some(group_id.clone())
                }
                _ => None,
            })
            .collect();
        groups.sort();
        groups.dedup();
        groups
    }

    /// Reduce the window to an SLA snapshot.
    ///
    /// Escalation effectiveness prefers the escalation manager's own figure
    /// and falls back to the mean signal value.
    pub fn snapshot(
        &self,
        window_ms: u64,
        now: DateTime<Utc>,
        targets: &SlaTargets,
        escalation: Option<&EscalationMetrics>,
    ) -> MetricsSnapshot {
        let since = clock::window_start(now, window_ms);
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());

        let mut acks = Vec::new();
        let mut suspected = Vec::new();
        let mut effectiveness = Vec::new();
        let mut exits = 0usize;
        let mut false_suppressions = 0usize;
        let mut re_noise = 0usize;
        for event in events.iter().filter(|e| e.at() >= since && e.at() <= now) {
            match event {
                MetricEvent::Signal {
                    ack_rate,
                    suspected_false_rate,
                    escalation_effectiveness,
                    ..
                } => {
                    acks.push(*ack_rate);
                    suspected.push(*suspected_false_rate);
                    effectiveness.push(*escalation_effectiveness);
                }
                MetricEvent::SuppressionExit { .. } => exits += 1,
                MetricEvent::FalseSuppression { .. } => false_suppressions += 1,
                MetricEvent::ReNoise { .. } => re_noise += 1,
            }
        }
        drop(events);

        let per_exit = |count: usize, target: f64| {
            if exits == 0 {
                target
            } else {
                (count as f64 / exits as f64).min(1.0)
            }
        };

        let escalation_effectiveness = match escalation {
            Some(m) if m.total > 0 => m.effectiveness,
            _ => stats::mean(&effectiveness).unwrap_or(targets.escalation_effectiveness),
        };

        MetricsSnapshot {
            ack_rate: stats::mean(&acks).unwrap_or(targets.ack_rate),
            escalation_effectiveness,
            false_suppression_rate: per_exit(false_suppressions, targets.false_suppression_rate),
            suspected_false_rate: stats::mean(&suspected).unwrap_or(targets.suspected_false_rate),
            re_noise_rate: per_exit(re_noise, targets.re_noise_rate),
        }
    }

    pub fn reset(&self) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::signals::SignalSnapshot;
    use crate::suppression::{ExitVerdict, TransitionRecord};

    fn evaluated(group: &str, ack: f64, verdict: Option<bool>, re_noise: bool) -> GroupEvaluation {
        GroupEvaluation::Evaluated {
            group_id: group.to_string(),
            state: SuppressionState::Active,
            noise_score: 0.3,
            transitioned: false,
            signals: SignalSnapshot {
                ack_rate: ack,
                suspected_false_rate: 0.1,
                volume: 10.0,
                dedup_ratio: 0.5,
                escalation_effectiveness: 0.4,
                severity: None,
            },
            exit_verdict: verdict.map(|suspected_false| ExitVerdict {
                mean_ack_during: 0.1,
                mean_ack_after: 0.5,
                suspected_false,
            }),
            re_noise,
        }
    }

    fn exit(group: &str, at: DateTime<Utc>) -> TransitionRecord {
        TransitionRecord {
            group_id: group.to_string(),
            from: SuppressionState::Suppressed,
            to: SuppressionState::Monitoring,
            at,
            suppressed_duration_ms: Some(1_000),
            noise_score: 0.2,
            entry_score: Some(0.7),
            exit_score: Some(0.2),
        }
    }

    #[test]
    fn test_empty_window_reports_targets() {
        let agg = MetricsAggregator::new();
        let targets = SlaTargets::default();
        let snap = agg.snapshot(60_000, Utc::now(), &targets, None);
        assert_eq!(snap, MetricsSnapshot::on_target(&targets));
    }

    #[test]
    fn test_rates_per_exit() {
        let agg = MetricsAggregator::new();
        let now = Utc::now();
        let batch = BatchResult {
            results: vec![
                evaluated("a", 0.2, Some(true), false),
                evaluated("b", 0.4, Some(false), true),
            ],
            transitions: vec![exit("a", now), exit("b", now)],
        };
        agg.record_batch(&batch, now);

        let snap = agg.snapshot(60_000, now, &SlaTargets::default(), None);
        assert!((snap.ack_rate - 0.3).abs() < 1e-9);
        assert_eq!(snap.false_suppression_rate, 0.5);
        assert_eq!(snap.re_noise_rate, 0.5);
        assert!((snap.suspected_false_rate - 0.1).abs() < 1e-9);
        assert!((snap.escalation_effectiveness - 0.4).abs() < 1e-9);
        assert_eq!(agg.false_suppression_groups(60_000, now), vec!["a".to_string()]);
    }

    #[test]
    fn test_old_events_fall_out_of_window() {
        let agg = MetricsAggregator::new();
        let then = Utc::now() - Duration::hours(2);
        let batch = BatchResult {
            results: vec![evaluated("a", 0.0, None, false)],
            transitions: vec![],
        };
        agg.record_batch(&batch, then);
        let counts = agg.counts(60_000, Utc::now());
        assert_eq!(counts, WindowCounts::default());
    }

    #[test]
    fn test_escalation_metrics_take_precedence() {
        let agg = MetricsAggregator::new();
        let now = Utc::now();
        agg.record_batch(
            &BatchResult {
                results: vec![evaluated("a", 0.5, None, false)],
                transitions: vec![],
            },
            now,
        );
        let esc = EscalationMetrics {
            total: 4,
            acked: 2,
            effectiveness: 0.25,
            suspected_false_fraction: 0.0,
            mean_ack_latency_ms: Some(1_000.0),
        };
        let snap = agg.snapshot(60_000, now, &SlaTargets::default(), Some(&esc));
        assert_eq!(snap.escalation_effectiveness, 0.25);
    }
}
