//! Dynamic SLA threshold
//!
//! ```text
//! samples < n_min  ──► threshold = base
//! otherwise        ──► threshold = max(base, p75 + max(0.2·p75, 0.1·base))
//! cooldown = clamp(0.5·threshold, cooldown_min, cooldown_max)
//! ```

use serde::{Deserialize, Serialize};

use crate::stats;

/// Percentile of historical ack latency the threshold tracks.
pub const LATENCY_PERCENTILE: f64 = 0.75;

/// Guardband as a fraction of the percentile latency.
pub const GUARDBAND_PERCENTILE_FACTOR: f64 = 0.2;

/// Guardband floor as a fraction of the base SLA.
pub const GUARDBAND_BASE_FACTOR: f64 = 0.1;

/// Cooldown as a fraction of the threshold, before clamping.
pub const COOLDOWN_THRESHOLD_FACTOR: f64 = 0.5;

/// Threshold in effect for one severity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlaThreshold {
    pub threshold_ms: u64,
    pub base_ms: u64,
    /// Percentile latency, when enough samples existed
    pub p75_ms: Option<f64>,
    pub sample_count: usize,
}

/// Compute the dynamic threshold from latency samples (ms).
pub fn dynamic_threshold(base_ms: u64, samples: &[f64], n_min_samples: usize) -> SlaThreshold {
    let fallback = SlaThreshold {
        threshold_ms: base_ms,
        base_ms,
        p75_ms: None,
        sample_count: samples.len(),
    };
    if samples.len() < n_min_samples {
        return fallback;
    }
    let Some(p75) = stats::percentile(samples, LATENCY_PERCENTILE) else {
        return fallback;
    };
    let base = base_ms as f64;
    let guardband = (GUARDBAND_PERCENTILE_FACTOR * p75).max(GUARDBAND_BASE_FACTOR * base);
    let threshold = base.max(p75 + guardband);
    SlaThreshold {
        threshold_ms: threshold.round() as u64,
        base_ms,
        p75_ms: Some(p75),
        sample_count: samples.len(),
    }
}

/// Re-escalation cooldown for a threshold.
pub fn cooldown_ms(threshold_ms: u64, cooldown_min_ms: u64, cooldown_max_ms: u64) -> u64 {
    let half = (threshold_ms as f64 * COOLDOWN_THRESHOLD_FACTOR).round() as u64;
    half.clamp(cooldown_min_ms, cooldown_max_ms)
}
