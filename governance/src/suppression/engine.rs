//! Suppression engine: owns per-group runtime state and drives the FSM
//! once per evaluation window.
//!
//! Groups within a batch are evaluated one after another. The group map is
//! written only here; readers get cloned snapshots.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::machine;
use super::state::{BatchResult, GroupEvaluation, GroupId, GroupRuntimeState, TransitionRecord};
use crate::config::{ConfigResult, SuppressionConfig};
use crate::signals::{SignalError, SignalSnapshot, SignalSource};
use crate::weights::WeightVector;

/// Shared reference to SuppressionEngine
pub type SharedSuppressionEngine = Arc<SuppressionEngine>;

pub struct SuppressionEngine {
    config: RwLock<SuppressionConfig>,
    groups: RwLock<HashMap<GroupId, GroupRuntimeState>>,
    transitions: Mutex<VecDeque<TransitionRecord>>,
    signal_timeout: Duration,
}

impl SuppressionEngine {
    /// Create an engine; `config` must already be validated.
    pub fn new(config: SuppressionConfig, signal_timeout: Duration) -> Self {
        Self {
            config: RwLock::new(config),
            groups: RwLock::new(HashMap::new()),
            transitions: Mutex::new(VecDeque::new()),
            signal_timeout,
        }
    }

    pub fn shared(self) -> SharedSuppressionEngine {
        Arc::new(self)
    }

    pub fn config(&self) -> SuppressionConfig {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Validate and swap the suppression config. Takes effect next window.
    pub fn reload(&self, config: SuppressionConfig) -> ConfigResult<()> {
        config.validate()?;
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = config;
        info!("Suppression config reloaded");
        Ok(())
    }

    /// Evaluate one window for the given groups with the given weights.
    pub async fn evaluate_window(
        &self,
        source: &dyn SignalSource,
        group_ids: &[GroupId],
        weights: &WeightVector,
        now: DateTime<Utc>,
    ) -> BatchResult {
        let config = self.config();
        let mut batch = BatchResult::default();

        for group_id in group_ids {
            let signals = match self.fetch(source, group_id).await {
                Ok(signals) => signals,
                Err(e) => {
                    warn!(group_id = %group_id, error = %e, "Skipping group for this window");
                    batch.results.push(GroupEvaluation::Skipped {
                        group_id: group_id.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            let signals = signals.sanitized();

            let outcome = {
                let mut groups = self.groups.write().unwrap_or_else(|e| e.into_inner());
                let group = groups
                    .entry(group_id.clone())
                    .or_insert_with(|| GroupRuntimeState::new(group_id.clone(), &config.hysteresis));
                machine::step(group, &signals, weights, &config, now)
            };

            debug!(
                group_id = %group_id,
                score = outcome.score,
                state = %outcome.state,
                "Group evaluated"
            );

            if let Some(record) = &outcome.transition {
                info!(
                    group_id = %group_id,
                    from = %record.from,
                    to = %record.to,
                    score = record.noise_score,
                    "Suppression state transition"
                );
                self.log_transition(record.clone(), config.transition_log_size);
                batch.transitions.push(record.clone());
            }

            batch.results.push(GroupEvaluation::Evaluated {
                group_id: group_id.clone(),
                state: outcome.state,
                noise_score: outcome.score,
                transitioned: outcome.transition.is_some(),
                signals,
                exit_verdict: outcome.exit_verdict,
                re_noise: outcome.re_noise,
            });
        }

        batch
    }

    async fn fetch(
        &self,
        source: &dyn SignalSource,
        group_id: &str,
    ) -> Result<SignalSnapshot, SignalError> {
        match tokio::time::timeout(self.signal_timeout, source.get_signals(group_id)).await {
            Ok(result) => result,
            Err(_) => Err(SignalError::Timeout(self.signal_timeout.as_millis() as u64)),
        }
    }

    fn log_transition(&self, record: TransitionRecord, cap: usize) {
        let mut log = self.transitions.lock().unwrap_or_else(|e| e.into_inner());
        log.push_back(record);
        while log.len() > cap {
            log.pop_front();
        }
    }

    /// Cloned state of one group, if it has been evaluated or hydrated.
    pub fn state(&self, group_id: &str) -> Option<GroupRuntimeState> {
        let groups = self.groups.read().unwrap_or_else(|e| e.into_inner());
        groups.get(group_id).cloned()
    }

    /// Cloned state of every group, sorted by id.
    pub fn snapshots(&self) -> Vec<GroupRuntimeState> {
        let groups = self.groups.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<GroupRuntimeState> = groups.values().cloned().collect();
        all.sort_by(|a, b| a.group_id.cmp(&b.group_id));
        all
    }

    /// Load persisted group states, replacing any with the same id.
    pub fn hydrate(&self, snapshots: Vec<GroupRuntimeState>) -> usize {
        let mut groups = self.groups.write().unwrap_or_else(|e| e.into_inner());
        let count = snapshots.len();
        for snapshot in snapshots {
            groups.insert(snapshot.group_id.clone(), snapshot);
        }
        count
    }

    /// Most recent transitions, oldest first.
    pub fn transition_log(&self) -> Vec<TransitionRecord> {
        let log = self.transitions.lock().unwrap_or_else(|e| e.into_inner());
        log.iter().cloned().collect()
    }

    pub fn group_count(&self) -> usize {
        self.groups.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Drop all group state and the transition log.
    pub fn reset(&self) {
        self.groups.write().unwrap_or_else(|e| e.into_inner()).clear();
        self.transitions.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
