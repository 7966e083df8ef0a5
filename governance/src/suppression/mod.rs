//! Noise suppression
//!
//! ```text
//! SignalSource ──► scorer ──► machine (hysteresis FSM) ──► BatchResult
//!                    ▲            ▲
//!               WeightVector   robust (median/MAD thresholds)
//! ```

pub mod engine;
pub mod machine;
pub mod robust;
pub mod scorer;
pub mod state;

pub use engine::{SharedSuppressionEngine, SuppressionEngine};
pub use robust::DynamicThresholds;
pub use state::{
    BatchResult, ExitVerdict, GroupEvaluation, GroupId, GroupRuntimeState, SuppressionState,
    TransitionRecord,
};
