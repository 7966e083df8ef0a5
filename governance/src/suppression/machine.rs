//! Suppression hysteresis state machine
//!
//! ```text
//!            noise ≥ high            noise ≥ high
//!  ACTIVE ─────────────────► CANDIDATE ─────────────► SUPPRESSED
//!    ▲   ◄─────────────────      │                      │    ▲
//!    │    blocked / low vol /    │               noise < low  │ re-spike
//!    │    noise < low                                   ▼    │ (unblocked)
//!    └──────────────────────────────────────────── MONITORING
//!         stable_recovery_windows cycles below low
//! ```
//!
//! Entry into CANDIDATE and SUPPRESSED requires the group to be unblocked,
//! above the volume floor and, when the robust high sits below the static
//! high, to have stayed above high for `min_consecutive_above_high` cycles.

use chrono::{DateTime, Utc};

use super::robust;
use super::scorer;
use super::state::{
    ExitVerdict, GroupRuntimeState, StepOutcome, SuppressionState, TransitionRecord,
};
use crate::config::SuppressionConfig;
use crate::signals::SignalSnapshot;
use crate::stats;
use crate::weights::WeightVector;

/// Whether a safety valve forbids suppression for these signals.
pub fn is_blocked(signals: &SignalSnapshot, config: &SuppressionConfig) -> bool {
    let protected = signals.severity == Some(config.protected_severity)
        && !config.allow_suppress_critical;
    protected
        || signals.escalation_effectiveness >= config.escalation_effectiveness_block_threshold
}

/// Evaluate one cycle for one group, mutating its runtime state.
pub fn step(
    group: &mut GroupRuntimeState,
    signals: &SignalSnapshot,
    weights: &WeightVector,
    config: &SuppressionConfig,
    now: DateTime<Utc>,
) -> StepOutcome {
    let signals = signals.sanitized();
    if signals.severity.is_some() {
        group.severity = signals.severity;
    }
    let effective = SignalSnapshot {
        severity: group.severity,
        ..signals
    };

    let thresholds = robust::estimate(
        &group.history.scores(),
        &config.robust,
        &config.hysteresis,
    );
    let score = scorer::noise_score(&effective, weights, config.min_volume);
    group
        .history
        .push(&effective, score, config.robust.history_size);
    group.noise_score = score;
    group.thresholds = thresholds;
    group.last_evaluated_at = Some(now);

    if score >= thresholds.high {
        group.above_high_streak = group.above_high_streak.saturating_add(1);
    } else {
        group.above_high_streak = 0;
    }
    let gate_open = !thresholds.lowered(&config.hysteresis)
        || group.above_high_streak >= config.robust.min_consecutive_above_high;
    let blocked = is_blocked(&effective, config);
    let volume_ok = effective.volume >= config.min_volume;
    let can_enter = !blocked && volume_ok && score >= thresholds.high && gate_open;

    let previous = group.state;
    let mut re_noise = false;
    let next = match previous {
        SuppressionState::Active => {
            if can_enter {
                SuppressionState::Candidate
            } else {
                SuppressionState::Active
            }
        }
        SuppressionState::Candidate => {
            if can_enter {
                SuppressionState::Suppressed
            } else if blocked || !volume_ok || score < thresholds.low {
                SuppressionState::Active
            } else {
                SuppressionState::Candidate
            }
        }
        SuppressionState::Suppressed => {
            if score < thresholds.low {
                SuppressionState::Monitoring
            } else {
                SuppressionState::Suppressed
            }
        }
        SuppressionState::Monitoring => {
            if score >= thresholds.high && !blocked {
                re_noise = true;
                SuppressionState::Suppressed
            } else if score < thresholds.low {
                group.stable_count += 1;
                if group.stable_count >= config.stable_recovery_windows {
                    SuppressionState::Active
                } else {
                    SuppressionState::Monitoring
                }
            } else {
                group.stable_count = 0;
                SuppressionState::Monitoring
            }
        }
    };

    // A pending exit is judged when MONITORING ends, before a re-entry
    // resets the buffers.
    let mut exit_verdict = None;
    if group.exit_under_review && previous == SuppressionState::Monitoring && next != previous {
        group.acks_after_exit.push(effective.ack_rate);
        exit_verdict = judge_exit(group, config);
    }

    let transition = if next != previous {
        Some(transition(group, previous, next, score, now))
    } else {
        None
    };

    if group.state == SuppressionState::Suppressed {
        group.suppressed_cycles += 1;
        group.acks_while_suppressed.push(effective.ack_rate);
    } else if group.exit_under_review {
        group.acks_after_exit.push(effective.ack_rate);
        if group.acks_after_exit.len() >= config.post_exit_ack_samples {
            exit_verdict = judge_exit(group, config);
        }
    }

    StepOutcome {
        score,
        state: group.state,
        transition,
        exit_verdict,
        re_noise,
    }
}

fn judge_exit(group: &mut GroupRuntimeState, config: &SuppressionConfig) -> Option<ExitVerdict> {
    group.exit_under_review = false;
    let after = std::mem::take(&mut group.acks_after_exit);
    let during = stats::mean(&group.acks_while_suppressed)?;
    let after = stats::mean(&after)?;
    Some(ExitVerdict {
        mean_ack_during: during,
        mean_ack_after: after,
        suspected_false: after - during > config.recovery_ack_rate_jump,
    })
}

fn transition(
    group: &mut GroupRuntimeState,
    from: SuppressionState,
    to: SuppressionState,
    score: f64,
    now: DateTime<Utc>,
) -> TransitionRecord {
    let mut suppressed_duration_ms = None;
    match (from, to) {
        (_, SuppressionState::Suppressed) => {
            group.entry_score = Some(score);
            group.suppression_started_at = Some(now);
            group.acks_while_suppressed.clear();
            group.exit_under_review = false;
            group.acks_after_exit.clear();
        }
        (SuppressionState::Suppressed, _) => {
            group.exit_score = Some(score);
            suppressed_duration_ms = group
                .suppression_started_at
                .map(|start| (now - start).num_milliseconds().max(0));
            group.exit_under_review = true;
            group.acks_after_exit.clear();
        }
        (SuppressionState::Monitoring, SuppressionState::Active) => {
            group.last_recovery_at = Some(now);
        }
        _ => {}
    }
    group.stable_count = 0;
    group.state = to;
    group.last_transition_at = Some(now);

    TransitionRecord {
        group_id: group.group_id.clone(),
        from,
        to,
        at: now,
        suppressed_duration_ms,
        noise_score: score,
        entry_score: group.entry_score,
        exit_score: group.exit_score,
    }
}
