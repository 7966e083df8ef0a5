use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use super::{PersistenceGateway, PersistenceResult};
use crate::suppression::{GroupRuntimeState, TransitionRecord};
use crate::weights::{AdjustmentOutcome, WeightsSnapshot};

const WEIGHTS_FILE: &str = "weights.json";
const SUPPRESSION_FILE: &str = "suppression.json";
const WEIGHT_AUDIT_FILE: &str = "weight_audit.jsonl";
const TRANSITION_AUDIT_FILE: &str = "transition_audit.jsonl";

/// Gateway writing JSON snapshots and JSON-lines audit logs under one
/// directory.
///
/// Snapshots are written to a temp file and renamed into place so a crash
/// mid-write leaves the previous snapshot intact.
pub struct JsonFileGateway {
    dir: PathBuf,
    /// Serializes appends so audit lines never interleave
    audit_lock: Mutex<()>,
}

impl JsonFileGateway {
    /// Open (and create if needed) a state directory.
    pub async fn open(dir: impl Into<PathBuf>) -> PersistenceResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            audit_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn write_snapshot<T: Serialize + ?Sized>(
        &self,
        name: &str,
        value: &T,
    ) -> PersistenceResult<()> {
        let path = self.dir.join(name);
        let temp_path = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(&temp_path, &content).await?;
        tokio::fs::rename(&temp_path, &path).await?;
        debug!(path = %path.display(), bytes = content.len(), "Snapshot written");
        Ok(())
    }

    async fn read_snapshot<T: DeserializeOwned>(&self, name: &str) -> PersistenceResult<Option<T>> {
        let path = self.dir.join(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn append_line<T: Serialize>(&self, name: &str, value: &T) -> PersistenceResult<()> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');

        let _guard = self.audit_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(name))
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for JsonFileGateway {
    async fn save_weights_snapshot(&self, snapshot: &WeightsSnapshot) -> PersistenceResult<()> {
        self.write_snapshot(WEIGHTS_FILE, snapshot).await
    }

    async fn load_latest_weights(&self) -> PersistenceResult<Option<WeightsSnapshot>> {
        self.read_snapshot(WEIGHTS_FILE).await
    }

    async fn save_suppression_snapshots(
        &self,
        snapshots: &[GroupRuntimeState],
    ) -> PersistenceResult<()> {
        self.write_snapshot(SUPPRESSION_FILE, snapshots).await
    }

    async fn load_suppression_snapshots(&self) -> PersistenceResult<Vec<GroupRuntimeState>> {
        Ok(self
            .read_snapshot(SUPPRESSION_FILE)
            .await?
            .unwrap_or_default())
    }

    async fn append_weight_audit(&self, entry: &AdjustmentOutcome) -> PersistenceResult<()> {
        self.append_line(WEIGHT_AUDIT_FILE, entry).await
    }

    async fn append_transition_audit(&self, entry: &TransitionRecord) -> PersistenceResult<()> {
        self.append_line(TRANSITION_AUDIT_FILE, entry).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AdaptiveWeightConfig, HysteresisConfig};
    use crate::suppression::SuppressionState;
    use crate::weights::{AdaptiveWeightController, WeightOverride, WeightVector};
    use chrono::Utc;

    #[tokio::test]
    async fn test_missing_files_load_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = JsonFileGateway::open(dir.path().join("state")).await.unwrap();
        assert!(gateway.load_latest_weights().await.unwrap().is_none());
        assert!(gateway.load_suppression_snapshots().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshots_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let controller =
            AdaptiveWeightController::new(AdaptiveWeightConfig::default(), WeightVector::default());
        let snap = controller.snapshot(Utc::now());

        let mut group = GroupRuntimeState::new("db-latency", &HysteresisConfig::default());
        group.state = SuppressionState::Suppressed;

        {
            let gateway = JsonFileGateway::open(dir.path()).await.unwrap();
            gateway.save_weights_snapshot(&snap).await.unwrap();
            gateway
                .save_suppression_snapshots(std::slice::from_ref(&group))
                .await
                .unwrap();
        }

        let gateway = JsonFileGateway::open(dir.path()).await.unwrap();
        let weights = gateway.load_latest_weights().await.unwrap().unwrap();
        assert_eq!(weights.weights, snap.weights);
        let groups = gateway.load_suppression_snapshots().await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].state, SuppressionState::Suppressed);
        assert!(!dir.path().join("weights.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_audit_appends_one_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = JsonFileGateway::open(dir.path()).await.unwrap();
        let controller =
            AdaptiveWeightController::new(AdaptiveWeightConfig::default(), WeightVector::default());

        for _ in 0..3 {
            let outcome = controller.set_weights(&WeightOverride::default(), Utc::now());
            gateway.append_weight_audit(&outcome).await.unwrap();
        }

        let raw = std::fs::read_to_string(dir.path().join(WEIGHT_AUDIT_FILE)).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 3);
        let first: AdjustmentOutcome = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.reason, crate::weights::AdjustmentReason::Override);
    }
}
