//! Per-group suppression state

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::robust::DynamicThresholds;
use crate::config::HysteresisConfig;
use crate::signals::{Severity, SignalSnapshot};

/// Dedup group identifier
pub type GroupId = String;

/// Hysteresis FSM state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionState {
    /// Alerts are surfaced normally
    #[default]
    Active,
    /// Noise crossed the high threshold once; awaiting confirmation
    Candidate,
    /// Alerts are suppressed as noise
    Suppressed,
    /// Suppression lifted; watching for recovery or a re-spike
    Monitoring,
}

impl std::fmt::Display for SuppressionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Candidate => write!(f, "candidate"),
            Self::Suppressed => write!(f, "suppressed"),
            Self::Monitoring => write!(f, "monitoring"),
        }
    }
}

/// Bounded rolling buffers of signal components and raw score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupHistory {
    pub ack_rate: VecDeque<f64>,
    pub suspected_false_rate: VecDeque<f64>,
    pub volume: VecDeque<f64>,
    pub dedup_ratio: VecDeque<f64>,
    pub escalation_effectiveness: VecDeque<f64>,
    pub noise_score: VecDeque<f64>,
}

impl GroupHistory {
    pub fn push(&mut self, signals: &SignalSnapshot, score: f64, cap: usize) {
        push_bounded(&mut self.ack_rate, signals.ack_rate, cap);
        push_bounded(&mut self.suspected_false_rate, signals.suspected_false_rate, cap);
        push_bounded(&mut self.volume, signals.volume, cap);
        push_bounded(&mut self.dedup_ratio, signals.dedup_ratio, cap);
        push_bounded(
            &mut self.escalation_effectiveness,
            signals.escalation_effectiveness,
            cap,
        );
        push_bounded(&mut self.noise_score, score, cap);
    }

    /// Raw scores, oldest first.
    pub fn scores(&self) -> Vec<f64> {
        self.noise_score.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.noise_score.len()
    }

    pub fn is_empty(&self) -> bool {
        self.noise_score.is_empty()
    }
}

fn push_bounded(buf: &mut VecDeque<f64>, value: f64, cap: usize) {
    buf.push_back(value);
    while buf.len() > cap {
        buf.pop_front();
    }
}

/// Runtime state of one dedup group.
///
/// Serializable as-is; this is also the persisted snapshot form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRuntimeState {
    pub group_id: GroupId,
    pub state: SuppressionState,
    /// Score from the most recent evaluation
    pub noise_score: f64,
    /// Score when the group last entered SUPPRESSED
    pub entry_score: Option<f64>,
    /// Score when the group last left SUPPRESSED
    pub exit_score: Option<f64>,
    /// Cycles spent in SUPPRESSED, cumulative
    pub suppressed_cycles: u64,
    pub history: GroupHistory,
    pub thresholds: DynamicThresholds,
    /// Consecutive below-low cycles while MONITORING
    pub stable_count: u32,
    /// Consecutive cycles at/above the effective high threshold
    pub above_high_streak: u32,
    /// Last severity reported by the signal source
    pub severity: Option<Severity>,
    pub last_evaluated_at: Option<DateTime<Utc>>,
    pub last_transition_at: Option<DateTime<Utc>>,
    pub suppression_started_at: Option<DateTime<Utc>>,
    pub last_recovery_at: Option<DateTime<Utc>>,
    /// Ack rates observed while suppressed
    pub acks_while_suppressed: Vec<f64>,
    /// Ack rates observed since the last exit from SUPPRESSED
    pub acks_after_exit: Vec<f64>,
    /// Whether the last exit still awaits its false-suppression verdict
    pub exit_under_review: bool,
}

impl GroupRuntimeState {
    pub fn new(group_id: impl Into<GroupId>, hysteresis: &HysteresisConfig) -> Self {
        Self {
            group_id: group_id.into(),
            state: SuppressionState::Active,
            noise_score: 0.0,
            entry_score: None,
            exit_score: None,
            suppressed_cycles: 0,
            history: GroupHistory::default(),
            thresholds: DynamicThresholds::fallback(hysteresis),
            stable_count: 0,
            above_high_streak: 0,
            severity: None,
            last_evaluated_at: None,
            last_transition_at: None,
            suppression_started_at: None,
            last_recovery_at: None,
            acks_while_suppressed: Vec::new(),
            acks_after_exit: Vec::new(),
            exit_under_review: false,
        }
    }

    pub fn is_suppressed(&self) -> bool {
        self.state == SuppressionState::Suppressed
    }
}

/// Immutable record of one FSM transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub group_id: GroupId,
    pub from: SuppressionState,
    pub to: SuppressionState,
    pub at: DateTime<Utc>,
    /// Time spent suppressed, set when leaving SUPPRESSED
    pub suppressed_duration_ms: Option<i64>,
    pub noise_score: f64,
    pub entry_score: Option<f64>,
    pub exit_score: Option<f64>,
}

/// Outcome of judging one exit from SUPPRESSED.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitVerdict {
    pub mean_ack_during: f64,
    pub mean_ack_after: f64,
    /// Ack rate jumped by more than the recovery cutoff after exit
    pub suspected_false: bool,
}

/// What one evaluation of a group produced.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub score: f64,
    pub state: SuppressionState,
    pub transition: Option<TransitionRecord>,
    pub exit_verdict: Option<ExitVerdict>,
    /// MONITORING → SUPPRESSED re-spike
    pub re_noise: bool,
}

/// Per-group result within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GroupEvaluation {
    Evaluated {
        group_id: GroupId,
        state: SuppressionState,
        noise_score: f64,
        transitioned: bool,
        /// Sanitized signals the evaluation used
        signals: SignalSnapshot,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_verdict: Option<ExitVerdict>,
        #[serde(default)]
        re_noise: bool,
    },
    /// Signal fetch failed or timed out; last state retained
    Skipped { group_id: GroupId, reason: String },
}

/// Result of one suppression window evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub results: Vec<GroupEvaluation>,
    pub transitions: Vec<TransitionRecord>,
}

impl BatchResult {
    pub fn evaluated(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r, GroupEvaluation::Evaluated { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.results.len() - self.evaluated()
    }
}
