//! In-memory alert store.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use super::types::{AckInsert, AckRecord, AlertId, AlertRecord, EscalationRecord};
use super::{AlertStore, StoreError, StoreResult};

/// The store's tables; also the on-disk layout of the file store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertTables {
    pub alerts: BTreeMap<AlertId, AlertRecord>,
    pub acks: BTreeMap<AlertId, AckRecord>,
    /// Append-only, in escalation order
    pub escalations: Vec<EscalationRecord>,
}

impl AlertTables {
    pub(crate) fn insert_ack_if_absent(&mut self, ack: AckRecord) -> AckInsert {
        if let Some(existing) = self.acks.get(&ack.alert_id) {
            return AckInsert::Existing(existing.clone());
        }
        self.acks.insert(ack.alert_id.clone(), ack.clone());
        AckInsert::Inserted(ack)
    }

    pub(crate) fn escalations_for(&self, alert_id: &str) -> Vec<EscalationRecord> {
        self.escalations
            .iter()
            .filter(|e| e.alert_id == alert_id)
            .cloned()
            .collect()
    }

    pub(crate) fn record_ack_latency(
        &mut self,
        escalation_id: &str,
        latency_ms: u64,
    ) -> StoreResult<bool> {
        let record = self
            .escalations
            .iter_mut()
            .find(|e| e.id == escalation_id)
            .ok_or_else(|| StoreError::NotFound(escalation_id.to_string()))?;
        if record.ack_latency_ms.is_some() {
            return Ok(false);
        }
        record.ack_latency_ms = Some(latency_ms);
        Ok(true)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAlertStore {
    tables: RwLock<AlertTables>,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tables(tables: AlertTables) -> Self {
        Self {
            tables: RwLock::new(tables),
        }
    }
}

impl AlertStore for InMemoryAlertStore {
    fn upsert_alert(&self, alert: AlertRecord) -> StoreResult<()> {
        let mut t = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        t.alerts.insert(alert.alert_id.clone(), alert);
        Ok(())
    }

    fn get_alert(&self, alert_id: &str) -> StoreResult<Option<AlertRecord>> {
        let t = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(t.alerts.get(alert_id).cloned())
    }

    fn list_alerts(&self) -> StoreResult<Vec<AlertRecord>> {
        let t = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(t.alerts.values().cloned().collect())
    }

    fn get_ack(&self, alert_id: &str) -> StoreResult<Option<AckRecord>> {
        let t = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(t.acks.get(alert_id).cloned())
    }

    fn insert_ack_if_absent(&self, ack: AckRecord) -> StoreResult<AckInsert> {
        let mut t = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(t.insert_ack_if_absent(ack))
    }

    fn remove_ack(&self, alert_id: &str) -> StoreResult<Option<AckRecord>> {
        let mut t = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(t.acks.remove(alert_id))
    }

    fn list_acks(&self) -> StoreResult<Vec<AckRecord>> {
        let t = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(t.acks.values().cloned().collect())
    }

    fn append_escalation(&self, record: EscalationRecord) -> StoreResult<()> {
        let mut t = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        t.escalations.push(record);
        Ok(())
    }

    fn escalations_for(&self, alert_id: &str) -> StoreResult<Vec<EscalationRecord>> {
        let t = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(t.escalations_for(alert_id))
    }

    fn list_escalations(&self) -> StoreResult<Vec<EscalationRecord>> {
        let t = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(t.escalations.clone())
    }

    fn record_ack_latency(&self, escalation_id: &str, latency_ms: u64) -> StoreResult<bool> {
        let mut t = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        t.record_ack_latency(escalation_id, latency_ms)
    }

    fn clear(&self) -> StoreResult<()> {
        let mut t = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        *t = AlertTables::default();
        Ok(())
    }
}
