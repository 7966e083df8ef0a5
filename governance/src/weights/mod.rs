//! Scoring weights and the closed-loop controller that tunes them.

pub mod controller;
pub mod vector;

pub use controller::{
    AdaptiveWeightController, AdjustmentOutcome, AdjustmentReason, ControllerState, MetricErrors,
    WeightsSnapshot,
};
pub use vector::{SharedWeights, WeightComponent, WeightOverride, WeightVector, WEIGHT_COUNT};
