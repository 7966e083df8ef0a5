//! Signal Source boundary
//!
//! The engine does not compute alert signals itself. Once per evaluation
//! cycle it asks a [`SignalSource`] for a normalized tuple per dedup group.
//! Values arrive pre-clamped, but [`SignalSnapshot::sanitized`] is applied
//! anyway before scoring so a misbehaving source cannot poison the history
//! buffers with NaN.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Alert severity tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    pub fn all() -> &'static [Severity] {
        &[
            Self::Critical,
            Self::High,
            Self::Medium,
            Self::Low,
            Self::Info,
        ]
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
            Self::Info => write!(f, "info"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            "info" => Ok(Self::Info),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// Per-cycle signal tuple for one dedup group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    /// Fraction of alerts acknowledged, in [0,1].
    pub ack_rate: f64,
    /// Fraction of alerts suspected to be false positives, in [0,1].
    pub suspected_false_rate: f64,
    /// Alert count in the cycle window (≥ 0).
    pub volume: f64,
    /// Fraction of alerts that were deduplicated, in [0,1].
    pub dedup_ratio: f64,
    /// How often escalations from this group lead to action, in [0,1].
    pub escalation_effectiveness: f64,
    /// Severity scope of the group, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

impl SignalSnapshot {
    /// Clamp rates to [0,1] and volume to ≥ 0; non-finite values become 0.
    pub fn sanitized(&self) -> Self {
        Self {
            ack_rate: unit(self.ack_rate),
            suspected_false_rate: unit(self.suspected_false_rate),
            volume: if self.volume.is_finite() {
                self.volume.max(0.0)
            } else {
                0.0
            },
            dedup_ratio: unit(self.dedup_ratio),
            escalation_effectiveness: unit(self.escalation_effectiveness),
            severity: self.severity,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }
}

fn unit(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Error returned by a signal source.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("no signals available for group {0}")]
    UnknownGroup(String),

    #[error("signal fetch timed out after {0}ms")]
    Timeout(u64),

    #[error("signal source unavailable: {0}")]
    Unavailable(String),
}

/// External collaborator supplying per-group signals.
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Fetch the current signal tuple for a group.
    async fn get_signals(&self, group_id: &str) -> Result<SignalSnapshot, SignalError>;

    /// Groups the periodic sweep should evaluate this cycle.
    async fn active_groups(&self) -> Result<Vec<String>, SignalError>;
}

/// Signal source backed by an in-process map.
///
/// Used by the daemon (which refreshes it from a file each tick) and by
/// tests that want to script signal sequences.
#[derive(Debug, Default)]
pub struct StaticSignalSource {
    signals: RwLock<HashMap<String, SignalSnapshot>>,
}

impl StaticSignalSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or replace the signals for one group.
    pub fn set(&self, group_id: impl Into<String>, snapshot: SignalSnapshot) {
        let mut map = self.signals.write().unwrap_or_else(|e| e.into_inner());
        map.insert(group_id.into(), snapshot);
    }

    /// Replace the entire signal table.
    pub fn replace_all(&self, signals: HashMap<String, SignalSnapshot>) {
        let mut map = self.signals.write().unwrap_or_else(|e| e.into_inner());
        *map = signals;
    }

    pub fn remove(&self, group_id: &str) {
        let mut map = self.signals.write().unwrap_or_else(|e| e.into_inner());
        map.remove(group_id);
    }
}

#[async_trait]
impl SignalSource for StaticSignalSource {
    async fn get_signals(&self, group_id: &str) -> Result<SignalSnapshot, SignalError> {
        let map = self.signals.read().unwrap_or_else(|e| e.into_inner());
        map.get(group_id)
            .copied()
            .ok_or_else(|| SignalError::UnknownGroup(group_id.to_string()))
    }

    async fn active_groups(&self) -> Result<Vec<String>, SignalError> {
        let map = self.signals.read().unwrap_or_else(|e| e.into_inner());
        let mut groups: Vec<String> = map.keys().cloned().collect();
        groups.sort();
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitized_clamps_and_drops_nan() {
        let raw = SignalSnapshot {
            ack_rate: 1.5,
            suspected_false_rate: f64::NAN,
            volume: -3.0,
            dedup_ratio: -0.1,
            escalation_effectiveness: f64::INFINITY,
            severity: None,
        };
        let s = raw.sanitized();
        assert_eq!(s.ack_rate, 1.0);
        assert_eq!(s.suspected_false_rate, 0.0);
        assert_eq!(s.volume, 0.0);
        assert_eq!(s.dedup_ratio, 0.0);
        assert_eq!(s.escalation_effectiveness, 0.0);
    }

    #[test]
    fn test_severity_parse_and_display() {
        for sev in Severity::all() {
            let parsed: Severity = sev.to_string().parse().unwrap();
            assert_eq!(parsed, *sev);
        }
        assert!("urgent".parse::<Severity>().is_err());
    }

    #[tokio::test]
    async fn test_static_source_lists_sorted_groups() {
        let source = StaticSignalSource::new();
        let snap = SignalSnapshot {
            ack_rate: 0.5,
            suspected_false_rate: 0.1,
            volume: 10.0,
            dedup_ratio: 0.5,
            escalation_effectiveness: 0.5,
            severity: None,
        };
        source.set("b", snap);
        source.set("a", snap);

        assert_eq!(source.active_groups().await.unwrap(), vec!["a", "b"]);
        assert!(source.get_signals("a").await.is_ok());
        assert!(matches!(
            source.get_signals("zzz").await,
            Err(SignalError::UnknownGroup(_))
        ));
    }
}
