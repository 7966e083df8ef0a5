//! Signal source backed by a JSON file.
//!
//! The file maps group id to its current signal tuple:
//!
//! ```json
//! { "db-latency": { "ack_rate": 0.1, "suspected_false_rate": 0.7,
//!                   "volume": 40, "dedup_ratio": 0.8,
//!                   "escalation_effectiveness": 0.2, "severity": "high" } }
//! ```
//!
//! The file is re-read whenever the sweep asks for its active groups, so an
//! external exporter can rewrite it between ticks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use governance::{SignalError, SignalSnapshot, SignalSource, StaticSignalSource};
use tracing::{debug, warn};

pub struct FileSignalSource {
    path: PathBuf,
    cache: StaticSignalSource,
}

impl FileSignalSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: StaticSignalSource::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file into the cache.
    pub async fn refresh(&self) -> Result<usize, SignalError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SignalError::Unavailable(format!("{}: {e}", self.path.display())))?;
        let table: HashMap<String, SignalSnapshot> = serde_json::from_str(&raw)
            .map_err(|e| SignalError::Unavailable(format!("{}: {e}", self.path.display())))?;
        let count = table.len();
        self.cache.replace_all(table);
        debug!(path = %self.path.display(), groups = count, "Signals refreshed");
        Ok(count)
    }
}

#[async_trait]
impl SignalSource for FileSignalSource {
    async fn get_signals(&self, group_id: &str) -> Result<SignalSnapshot, SignalError> {
        self.cache.get_signals(group_id).await
    }

    async fn active_groups(&self) -> Result<Vec<String>, SignalError> {
        // A bad rewrite keeps the previous table rather than stalling the sweep.
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "Signal file unreadable, reusing last table");
        }
        self.cache.active_groups().await
    }
}
