//! Alert store
//!
//! Alerts, acknowledgements and escalation records behind one interface
//! with two implementations:
//!
//! - [`InMemoryAlertStore`]: process-local tables
//! - [`JsonFileAlertStore`]: the same tables, written through to a JSON file
//!   (temp file + rename) after every mutation

pub mod file;
pub mod memory;
pub mod types;

use std::sync::Arc;

pub use file::JsonFileAlertStore;
pub use memory::{AlertTables, InMemoryAlertStore};
pub use types::{AckInsert, AckRecord, AlertId, AlertRecord, EscalationReason, EscalationRecord};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Lock poisoned")]
    LockPoisoned,
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to an AlertStore
pub type SharedAlertStore = Arc<dyn AlertStore>;

/// Storage for alerts, acks and escalations.
pub trait AlertStore: Send + Sync {
    fn upsert_alert(&self, alert: AlertRecord) -> StoreResult<()>;

    fn get_alert(&self, alert_id: &str) -> StoreResult<Option<AlertRecord>>;

    fn list_alerts(&self) -> StoreResult<Vec<AlertRecord>>;

    fn get_ack(&self, alert_id: &str) -> StoreResult<Option<AckRecord>>;

    /// Insert `ack` unless one exists; never overwrites.
    fn insert_ack_if_absent(&self, ack: AckRecord) -> StoreResult<AckInsert>;

    /// Remove and return the ack, if any.
    fn remove_ack(&self, alert_id: &str) -> StoreResult<Option<AckRecord>>;

    fn list_acks(&self) -> StoreResult<Vec<AckRecord>>;

    fn append_escalation(&self, record: EscalationRecord) -> StoreResult<()>;

    /// Escalations of one alert, oldest first.
    fn escalations_for(&self, alert_id: &str) -> StoreResult<Vec<EscalationRecord>>;

    fn list_escalations(&self) -> StoreResult<Vec<EscalationRecord>>;

    /// Write ack latency on an escalation unless already set. Returns
    /// whether this call wrote it.
    fn record_ack_latency(&self, escalation_id: &str, latency_ms: u64) -> StoreResult<bool>;

    /// Drop every record.
    fn clear(&self) -> StoreResult<()>;
}
