//! Ack ledger: idempotent acknowledgement on top of the alert store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{GovernanceError, GovernanceResult};
use crate::store::{AckInsert, AckRecord, SharedAlertStore};

/// Result of [`AckLedger::ack`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckOutcome {
    pub alert_id: String,
    /// Timestamp of the ack in effect; the original one on a repeat.
    pub acknowledged_at: DateTime<Utc>,
    pub already_acked: bool,
}

/// Result of [`AckLedger::unack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnackOutcome {
    pub changed: bool,
}

pub struct AckLedger {
    store: SharedAlertStore,
}

impl AckLedger {
    pub fn new(store: SharedAlertStore) -> Self {
        Self { store }
    }

    /// Acknowledge an alert. Unknown ids are `NotFound`; a repeat ack
    /// succeeds and reports the existing timestamp.
    pub fn ack(
        &self,
        alert_id: &str,
        actor: &str,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> GovernanceResult<(AckOutcome, Option<AckRecord>)> {
        if self.store.get_alert(alert_id)?.is_none() {
            return Err(GovernanceError::NotFound {
                alert_id: alert_id.to_string(),
            });
        }
        let insert = self.store.insert_ack_if_absent(AckRecord {
            alert_id: alert_id.to_string(),
            acknowledged_at: now,
            actor: actor.to_string(),
            note,
        })?;
        let outcome = AckOutcome {
            alert_id: alert_id.to_string(),
            acknowledged_at: insert.record().acknowledged_at,
            already_acked: matches!(insert, AckInsert::Existing(_)),
        };
        match insert {
            AckInsert::Inserted(record) => {
                info!(alert_id, actor, "Alert acknowledged");
                Ok((outcome, Some(record)))
            }
            AckInsert::Existing(_) => {
                debug!(alert_id, "Repeat ack ignored");
                Ok((outcome, None))
            }
        }
    }

    /// Remove an ack. `changed` is false when there was none.
    pub fn unack(&self, alert_id: &str) -> GovernanceResult<UnackOutcome> {
        let removed = self.store.remove_ack(alert_id)?;
        if removed.is_some() {
            info!(alert_id, "Alert unacknowledged");
        }
        Ok(UnackOutcome {
            changed: removed.is_some(),
        })
    }

    pub fn get(&self, alert_id: &str) -> GovernanceResult<Option<AckRecord>> {
        Ok(self.store.get_ack(alert_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::Severity;
    use crate::store::{AlertRecord, AlertStore, InMemoryAlertStore};
    use chrono::Duration;
    use std::sync::Arc;

    fn ledger() -> AckLedger {
        let store = Arc::new(InMemoryAlertStore::new());
        store
            .upsert_alert(AlertRecord::new("a1", "g", Severity::High, Utc::now()))
            .unwrap();
        AckLedger::new(store)
    }

    #[test]
    fn test_repeat_ack_returns_original_timestamp() {
        let ledger = ledger();
        let t0 = Utc::now();
        let (first, record) = ledger.ack("a1", "alice", None, t0).unwrap();
        assert!(!first.already_acked);
        assert!(record.is_some());

        let (second, record) = ledger
            .ack("a1", "bob", None, t0 + Duration::minutes(5))
            .unwrap();
        assert!(second.already_acked);
        assert!(record.is_none());
        assert_eq!(first.acknowledged_at, second.acknowledged_at);
    }

    #[test]
    fn test_unknown_alert_is_not_found() {
        let ledger = ledger();
        let err = ledger.ack("ghost", "alice", None, Utc::now()).unwrap_err();
        assert!(matches!(err, GovernanceError::NotFound { .. }));
    }

    #[test]
    fn test_unack_reports_change() {
        let ledger = ledger();
        assert!(!ledger.unack("a1").unwrap().changed);
        ledger.ack("a1", "alice", None, Utc::now()).unwrap();
        assert!(ledger.unack("a1").unwrap().changed);
        assert!(ledger.get("a1").unwrap().is_none());
    }
}
