use std::sync::Mutex;

use async_trait::async_trait;

use super::{PersistenceGateway, PersistenceResult};
use crate::suppression::{GroupRuntimeState, TransitionRecord};
use crate::weights::{AdjustmentOutcome, WeightsSnapshot};

#[derive(Debug, Default)]
struct Stored {
    weights: Option<WeightsSnapshot>,
    suppression: Vec<GroupRuntimeState>,
    weight_audit: Vec<AdjustmentOutcome>,
    transition_audit: Vec<TransitionRecord>,
}

/// Gateway that keeps everything in process memory.
///
/// Useful for tests and for wiring a governor whose restart semantics do
/// not matter.
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    stored: Mutex<Stored>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn weight_audit(&self) -> Vec<AdjustmentOutcome> {
        self.lock().weight_audit.clone()
    }

    pub fn transition_audit(&self) -> Vec<TransitionRecord> {
        self.lock().transition_audit.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Stored> {
        self.stored.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryGateway {
    async fn save_weights_snapshot(&self, snapshot: &WeightsSnapshot) -> PersistenceResult<()> {
        self.lock().weights = Some(snapshot.clone());
        Ok(())
    }

    async fn load_latest_weights(&self) -> PersistenceResult<Option<WeightsSnapshot>> {
        Ok(self.lock().weights.clone())
    }

    async fn save_suppression_snapshots(
        &self,
        snapshots: &[GroupRuntimeState],
    ) -> PersistenceResult<()> {
        self.lock().suppression = snapshots.to_vec();
        Ok(())
    }

    async fn load_suppression_snapshots(&self) -> PersistenceResult<Vec<GroupRuntimeState>> {
        Ok(self.lock().suppression.clone())
    }

    async fn append_weight_audit(&self, entry: &AdjustmentOutcome) -> PersistenceResult<()> {
        self.lock().weight_audit.push(entry.clone());
        Ok(())
    }

    async fn append_transition_audit(&self, entry: &TransitionRecord) -> PersistenceResult<()> {
        self.lock().transition_audit.push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::{AdaptiveWeightController, WeightVector};
    use crate::config::AdaptiveWeightConfig;
    use chrono::Utc;

    #[tokio::test]
    async fn test_weights_round_trip_in_memory() {
        let gateway = InMemoryGateway::new();
        assert!(gateway.load_latest_weights().await.unwrap().is_none());

        let controller =
            AdaptiveWeightController::new(AdaptiveWeightConfig::default(), WeightVector::default());
        let snap = controller.snapshot(Utc::now());
        gateway.save_weights_snapshot(&snap).await.unwrap();

        let loaded = gateway.load_latest_weights().await.unwrap().unwrap();
        assert_eq!(loaded.weights, snap.weights);
    }
}
