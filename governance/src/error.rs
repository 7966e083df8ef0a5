//! Top-level error type for governor operations.

use crate::config::ConfigError;
use crate::persistence::PersistenceError;
use crate::signals::SignalError;
use crate::store::StoreError;

/// Error returned by [`crate::AlertGovernor`] operations.
#[derive(Debug, thiserror::Error)]
pub enum GovernanceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Store I/O failed; distinct from a missing alert.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("alert not found: {alert_id}")]
    NotFound { alert_id: String },

    #[error("alert already acknowledged: {alert_id}")]
    AlreadyAcknowledged { alert_id: String },

    #[error(transparent)]
    Signal(#[from] SignalError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Result type for governor operations
pub type GovernanceResult<T> = Result<T, GovernanceError>;
