//! SLA escalation
//!
//! Runs on its own cadence, independent of suppression. Reads alerts and
//! acks from the store, appends escalation records, and reports
//! effectiveness back to the metrics aggregator.

pub mod manager;
pub mod sla;

pub use manager::{EscalationManager, EscalationMetrics, SweepReport};
pub use sla::SlaThreshold;
