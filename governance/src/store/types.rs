//! Record types held by the alert store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::signals::Severity;

/// Alert identifier
pub type AlertId = String;

/// An alert known to the governor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub alert_id: AlertId,
    /// Dedup group the alert belongs to
    pub group_id: String,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
}

impl AlertRecord {
    pub fn new(
        alert_id: impl Into<AlertId>,
        group_id: impl Into<String>,
        severity: Severity,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            alert_id: alert_id.into(),
            group_id: group_id.into(),
            severity,
            created_at,
        }
    }
}

/// Acknowledgement; at most one per alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckRecord {
    pub alert_id: AlertId,
    pub acknowledged_at: DateTime<Utc>,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Outcome of a conditional ack insert.
#[derive(Debug, Clone, PartialEq)]
pub enum AckInsert {
    Inserted(AckRecord),
    /// An ack already existed and was left untouched
    Existing(AckRecord),
}

impl AckInsert {
    pub fn record(&self) -> &AckRecord {
        match self {
            Self::Inserted(r) | Self::Existing(r) => r,
        }
    }
}

/// Why an escalation was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// Unacked age reached the dynamic SLA threshold
    SlaBreach,
    /// Operator forced the escalation
    Manual,
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SlaBreach => write!(f, "sla_breach"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// One escalation of one alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub id: String,
    pub alert_id: AlertId,
    pub alert_created_at: DateTime<Utc>,
    pub severity: Severity,
    pub escalated_at: DateTime<Utc>,
    pub reason: EscalationReason,
    /// SLA threshold in effect when escalated
    pub threshold_ms: u64,
    /// Unacked age at escalation
    pub age_ms: u64,
    /// The same alert is not escalated again before this instant
    pub cooldown_until: DateTime<Utc>,
    /// Ack latency after escalation; written once
    pub ack_latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

impl EscalationRecord {
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}
