//! Robust threshold estimator
//!
//! Turns a group's raw noise-score history into dynamic hysteresis
//! thresholds using median and MAD:
//!
//! ```text
//! high = clamp(median + k_high·MAD)      low = clamp(median + k_low·MAD)
//!                  │
//!                  ▼
//! last 5 scores non-decreasing?  ──yes──► high = max(high, static_high·0.7)
//!                  └──────────────no───► high = max(high, static_high·0.85)
//! ```
//!
//! Under-sampled or disabled histories fall back to the static thresholds.

use serde::{Deserialize, Serialize};

use crate::config::{HysteresisConfig, RobustConfig};
use crate::stats;

/// Number of most recent scores inspected for an upward drift.
pub const DRIFT_WINDOW: usize = 5;

/// Floor on the dynamic high, as a fraction of the static high, while the
/// recent scores are rising. Empirical; tunable.
pub const RISING_DRIFT_FLOOR: f64 = 0.7;

/// Floor on the dynamic high, as a fraction of the static high, otherwise.
/// Empirical; tunable.
pub const STEADY_DRIFT_FLOOR: f64 = 0.85;

/// Thresholds in effect for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DynamicThresholds {
    pub high: f64,
    pub low: f64,
    /// Median of the history (0 when static).
    pub median: f64,
    /// Floored MAD of the history (0 when static).
    pub mad: f64,
    /// Whether these came from the history rather than static config.
    pub robust: bool,
}

impl DynamicThresholds {
    pub fn fallback(hysteresis: &HysteresisConfig) -> Self {
        Self {
            high: hysteresis.high,
            low: hysteresis.low,
            median: 0.0,
            mad: 0.0,
            robust: false,
        }
    }

    /// Whether the robust high sits below the static one, which is when
    /// consecutive-cycle gating applies.
    pub fn lowered(&self, hysteresis: &HysteresisConfig) -> bool {
        self.robust && self.high < hysteresis.high
    }
}

/// Compute thresholds from a score history (oldest first).
pub fn estimate(
    history: &[f64],
    robust: &RobustConfig,
    hysteresis: &HysteresisConfig,
) -> DynamicThresholds {
    if !robust.enabled || history.len() < robust.min_samples_for_robust {
        return DynamicThresholds::fallback(hysteresis);
    }
    let Some(median) = stats::median(history) else {
        return DynamicThresholds::fallback(hysteresis);
    };
    let mad = stats::mad(history, median)
        .unwrap_or(0.0)
        .max(robust.epsilon_mad);

    let candidate_high = (median + robust.k_high * mad).clamp(0.0, 1.0);
    let candidate_low = (median + robust.k_low * mad).clamp(0.0, 1.0);

    let floor = if rising(history) {
        RISING_DRIFT_FLOOR
    } else {
        STEADY_DRIFT_FLOOR
    };
    let high = candidate_high.max(hysteresis.high * floor).clamp(0.0, 1.0);

    DynamicThresholds {
        high,
        low: candidate_low.min(high),
        median,
        mad,
        robust: true,
    }
}

fn rising(history: &[f64]) -> bool {
    if history.len() < DRIFT_WINDOW {
        return false;
    }
    history[history.len() - DRIFT_WINDOW..]
        .windows(2)
        .all(|pair| pair[1] >= pair[0])
}
