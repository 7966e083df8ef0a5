//! Adaptive Alert Governance
//!
//! This library decides, per deduplicated alert group, whether to let
//! alerts through or suppress them, tunes its own scoring weights from
//! observed operator behavior, and escalates alerts that sit
//! unacknowledged past a dynamic SLA.
//!
//! # Subsystems
//!
//! ## Suppression
//! - Noise score: weighted blend of ack deficit, suspected-false rate,
//!   volume, dedup ratio and escalation ineffectiveness
//! - Hysteresis state machine: ACTIVE → CANDIDATE → SUPPRESSED → MONITORING
//! - Robust thresholds from median/MAD of score history, with consecutive
//!   windows required before a lowered threshold can act
//!
//! ## Weight tuning
//! - Closed-loop controller nudging weights toward SLA targets
//! - Deadband, cooldown, per-cycle drift cap, outlier rejection, freeze on
//!   convergence and severe-deviation override
//!
//! ## Escalation
//! - Per-severity dynamic SLA from historical ack latency
//! - Cooldown between escalations of one alert
//! - Idempotent acknowledgement with ack-after-escalation latency
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use governance::{AlertGovernor, GovernanceConfig, InMemoryAlertStore, StaticSignalSource};
//!
//! # async fn demo() -> Result<(), governance::GovernanceError> {
//! let source = Arc::new(StaticSignalSource::new());
//! let governor = AlertGovernor::new(
//!     GovernanceConfig::default(),
//!     Arc::new(InMemoryAlertStore::new()),
//!     source,
//! )?;
//! let batch = governor
//!     .evaluate_suppression_window(&["db-latency".to_string()])
//!     .await;
//! println!("{} groups evaluated", batch.evaluated());
//! # Ok(())
//! # }
//! ```

pub mod ack;
pub mod clock;
pub mod config;
pub mod error;
pub mod escalation;
pub mod events;
pub mod governor;
pub mod metrics;
pub mod persistence;
pub mod scheduler;
pub mod signals;
pub mod stats;
pub mod store;
pub mod suppression;
pub mod weights;

pub use ack::{AckOutcome, UnackOutcome};
pub use config::{
    AdaptiveWeightConfig, ConfigError, EscalationConfig, GovernanceConfig, SuppressionConfig,
};
pub use error::{GovernanceError, GovernanceResult};
pub use escalation::{EscalationMetrics, SweepReport};
pub use events::{EventBus, EventFilter, EventHandler, GovernanceEvent};
pub use governor::{AlertGovernor, GovernorSweep, RestoreReport, SweepKind};
pub use metrics::{MetricKind, MetricsSnapshot};
pub use persistence::{InMemoryGateway, JsonFileGateway, PersistenceError, PersistenceGateway};
pub use scheduler::{spawn_periodic, SweepGate, SweepTask};
pub use signals::{Severity, SignalError, SignalSnapshot, SignalSource, StaticSignalSource};
pub use store::{
    AlertRecord, AlertStore, EscalationRecord, InMemoryAlertStore, JsonFileAlertStore, StoreError,
};
pub use suppression::{BatchResult, GroupEvaluation, GroupRuntimeState, SuppressionState};
pub use weights::{AdjustmentOutcome, AdjustmentReason, WeightOverride, WeightVector};
