//! Governance events
//!
//! Emitted by the governor after each decision; consumed by broadcast
//! subscribers and registered handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::EscalationRecord;
use crate::suppression::{ExitVerdict, TransitionRecord};
use crate::weights::AdjustmentOutcome;

/// All governance events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GovernanceEvent {
    /// A group changed suppression state
    SuppressionTransition { record: TransitionRecord },

    /// A group was skipped for one window (signal error or timeout)
    GroupSkipped {
        group_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The ack-rate jump after an exit marked it as a likely false suppression
    FalseSuppressionSuspected {
        group_id: String,
        verdict: ExitVerdict,
        timestamp: DateTime<Utc>,
    },

    /// A weight controller decision (including no-ops and overrides)
    WeightDecision { outcome: AdjustmentOutcome },

    /// An alert was escalated by the sweep or manually
    AlertEscalated { record: EscalationRecord },

    AlertAcknowledged {
        alert_id: String,
        actor: String,
        timestamp: DateTime<Utc>,
    },

    AlertUnacknowledged {
        alert_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A best-effort persistence call failed; in-memory state stands
    PersistenceFailed {
        operation: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl GovernanceEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            GovernanceEvent::SuppressionTransition { record } => record.at,
            GovernanceEvent::GroupSkipped { timestamp, .. } => *timestamp,
            GovernanceEvent::FalseSuppressionSuspected { timestamp, .. } => *timestamp,
            GovernanceEvent::WeightDecision { outcome } => outcome.at,
            GovernanceEvent::AlertEscalated { record } => record.escalated_at,
            GovernanceEvent::AlertAcknowledged { timestamp, .. } => *timestamp,
            GovernanceEvent::AlertUnacknowledged { timestamp, .. } => *timestamp,
            GovernanceEvent::PersistenceFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            GovernanceEvent::SuppressionTransition { .. } => "suppression_transition",
            GovernanceEvent::GroupSkipped { .. } => "group_skipped",
            GovernanceEvent::FalseSuppressionSuspected { .. } => "false_suppression_suspected",
            GovernanceEvent::WeightDecision { .. } => "weight_decision",
            GovernanceEvent::AlertEscalated { .. } => "alert_escalated",
            GovernanceEvent::AlertAcknowledged { .. } => "alert_acknowledged",
            GovernanceEvent::AlertUnacknowledged { .. } => "alert_unacknowledged",
            GovernanceEvent::PersistenceFailed { .. } => "persistence_failed",
        }
    }

    /// Get the dedup group if this event is group-scoped
    pub fn group_id(&self) -> Option<&str> {
        match self {
            GovernanceEvent::SuppressionTransition { record } => Some(&record.group_id),
            GovernanceEvent::GroupSkipped { group_id, .. } => Some(group_id),
            GovernanceEvent::FalseSuppressionSuspected { group_id, .. } => Some(group_id),
            _ => None,
        }
    }

    /// Get the alert id if this event is alert-scoped
    pub fn alert_id(&self) -> Option<&str> {
        match self {
            GovernanceEvent::AlertEscalated { record } => Some(&record.alert_id),
            GovernanceEvent::AlertAcknowledged { alert_id, .. } => Some(alert_id),
            GovernanceEvent::AlertUnacknowledged { alert_id, .. } => Some(alert_id),
            _ => None,
        }
    }
}
