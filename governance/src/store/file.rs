//! JSON file alert store
//!
//! Keeps the tables in memory and rewrites the whole file after every
//! mutation: serialize to `<path>.tmp`, then rename over `<path>`, so a
//! crash mid-write leaves the previous file intact. Mutations apply to a
//! copy of the tables that replaces the live one only after the flush
//! succeeds, so memory never runs ahead of disk.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::debug;

use super::memory::AlertTables;
use super::types::{AckInsert, AckRecord, AlertRecord, EscalationRecord};
use super::{AlertStore, StoreError, StoreResult};

#[derive(Debug)]
pub struct JsonFileAlertStore {
    tables: RwLock<AlertTables>,
    path: PathBuf,
}

impl JsonFileAlertStore {
    /// Open the store at `path`, loading existing tables if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let tables = if path.exists() {
            let json = std::fs::read_to_string(&path)?;
            serde_json::from_str(&json).map_err(|e| StoreError::Serialization(e.to_string()))?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            AlertTables::default()
        };
        Ok(Self {
            tables: RwLock::new(tables),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, tables: &AlertTables) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(tables)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "Alert store flushed");
        Ok(())
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut AlertTables) -> StoreResult<T>) -> StoreResult<T> {
        let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        let mut next = tables.clone();
        let out = f(&mut next)?;
        if next != *tables {
            self.flush(&next)?;
            *tables = next;
        }
        Ok(out)
    }

    fn read<T>(&self, f: impl FnOnce(&AlertTables) -> T) -> StoreResult<T> {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(f(&*tables))
    }
}

impl AlertStore for JsonFileAlertStore {
    fn upsert_alert(&self, alert: AlertRecord) -> StoreResult<()> {
        self.mutate(|t| {
            t.alerts.insert(alert.alert_id.clone(), alert);
            Ok(())
        })
    }

    fn get_alert(&self, alert_id: &str) -> StoreResult<Option<AlertRecord>> {
        self.read(|t| t.alerts.get(alert_id).cloned())
    }

    fn list_alerts(&self) -> StoreResult<Vec<AlertRecord>> {
        self.read(|t| t.alerts.values().cloned().collect())
    }

    fn get_ack(&self, alert_id: &str) -> StoreResult<Option<AckRecord>> {
        self.read(|t| t.acks.get(alert_id).cloned())
    }

    fn insert_ack_if_absent(&self, ack: AckRecord) -> StoreResult<AckInsert> {
        self.mutate(|t| Ok(t.insert_ack_if_absent(ack)))
    }

    fn remove_ack(&self, alert_id: &str) -> StoreResult<Option<AckRecord>> {
        self.mutate(|t| Ok(t.acks.remove(alert_id)))
    }

    fn list_acks(&self) -> StoreResult<Vec<AckRecord>> {
        self.read(|t| t.acks.values().cloned().collect())
    }

    fn append_escalation(&self, record: EscalationRecord) -> StoreResult<()> {
        self.mutate(|t| {
            t.escalations.push(record);
            Ok(())
        })
    }

    fn escalations_for(&self, alert_id: &str) -> StoreResult<Vec<EscalationRecord>> {
        self.read(|t| t.escalations_for(alert_id))
    }

    fn list_escalations(&self) -> StoreResult<Vec<EscalationRecord>> {
        self.read(|t| t.escalations.clone())
    }

    fn record_ack_latency(&self, escalation_id: &str, latency_ms: u64) -> StoreResult<bool> {
        self.mutate(|t| t.record_ack_latency(escalation_id, latency_ms))
    }

    fn clear(&self) -> StoreResult<()> {
        self.mutate(|t| {
            *t = AlertTables::default();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::Severity;
    use chrono::Utc;
    use tempfile::TempDir;

    #[test]
    fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alerts.json");

        let store = JsonFileAlertStore::open(&path).unwrap();
        let created = Utc::now();
        store
            .upsert_alert(AlertRecord::new("a1", "db", Severity::High, created))
            .unwrap();
        store
            .insert_ack_if_absent(AckRecord {
                alert_id: "a1".into(),
                acknowledged_at: created,
                actor: "alice".into(),
                note: Some("looking".into()),
            })
            .unwrap();
        drop(store);

        let reopened = JsonFileAlertStore::open(&path).unwrap();
        let alert = reopened.get_alert("a1").unwrap().unwrap();
        assert_eq!(alert.group_id, "db");
        assert_eq!(alert.created_at, created);
        assert_eq!(
            reopened.get_ack("a1").unwrap().unwrap().note.as_deref(),
            Some("looking")
        );
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_failed_flush_leaves_memory_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alerts.json");
        let store = JsonFileAlertStore::open(&path).unwrap();
        store
            .upsert_alert(AlertRecord::new("a1", "db", Severity::High, Utc::now()))
            .unwrap();

        // A directory squatting on the temp path makes the write fail.
        std::fs::create_dir(path.with_extension("json.tmp")).unwrap();
        let result = store.insert_ack_if_absent(AckRecord {
            alert_id: "a1".into(),
            acknowledged_at: Utc::now(),
            actor: "alice".into(),
            note: None,
        });
        assert!(result.is_err());
        assert!(store.get_ack("a1").unwrap().is_none());
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/state/alerts.json");
        let store = JsonFileAlertStore::open(&path).unwrap();
        store
            .upsert_alert(AlertRecord::new("a1", "g", Severity::Low, Utc::now()))
            .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_corrupt_file_is_serialization_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alerts.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            JsonFileAlertStore::open(&path),
            Err(StoreError::Serialization(_))
        ));
    }
}
