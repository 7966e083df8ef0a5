//! Persistence gateway
//!
//! Best-effort snapshot/restore of weight and suppression state plus
//! append-only audit trails. The governor treats every call as optional:
//! a failure is logged and the in-memory decision stands.
//!
//! ```text
//! state_dir/
//! ├── weights.json              latest WeightsSnapshot
//! ├── suppression.json          Vec<GroupRuntimeState>
//! ├── weight_audit.jsonl        one AdjustmentOutcome per line
//! └── transition_audit.jsonl    one TransitionRecord per line
//! ```

mod file;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::suppression::{GroupRuntimeState, TransitionRecord};
use crate::weights::{AdjustmentOutcome, WeightsSnapshot};

pub use file::JsonFileGateway;
pub use memory::InMemoryGateway;

/// Error type for persistence operations
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Persistence I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Persistence serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Persistence {operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Persistence backend unavailable: {0}")]
    Unavailable(String),
}

/// Result type for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Shared reference to a gateway
pub type SharedPersistenceGateway = Arc<dyn PersistenceGateway>;

/// Durable storage behind the governor.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn save_weights_snapshot(&self, snapshot: &WeightsSnapshot) -> PersistenceResult<()>;

    /// Latest saved weights, or `None` when nothing was ever saved.
    async fn load_latest_weights(&self) -> PersistenceResult<Option<WeightsSnapshot>>;

    /// Replace the stored suppression snapshot set.
    async fn save_suppression_snapshots(
        &self,
        snapshots: &[GroupRuntimeState],
    ) -> PersistenceResult<()>;

    async fn load_suppression_snapshots(&self) -> PersistenceResult<Vec<GroupRuntimeState>>;

    async fn append_weight_audit(&self, entry: &AdjustmentOutcome) -> PersistenceResult<()>;

    async fn append_transition_audit(&self, entry: &TransitionRecord) -> PersistenceResult<()>;
}
