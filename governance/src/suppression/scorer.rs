//! Noise scorer
//!
//! ```text
//! raw = w1·(1 − ack) + w2·suspected_false + w3·volume_norm
//!     + w4·(1 − dedup) + w5·(1 − escalation_effectiveness)
//! volume_norm = volume / max(volume, min_volume·5)
//! ```

use crate::signals::SignalSnapshot;
use crate::weights::WeightVector;

/// Volume at `min_volume · VOLUME_SATURATION` or above normalizes to 1.
pub const VOLUME_SATURATION: f64 = 5.0;

/// Volume mapped to [0,1].
pub fn volume_norm(volume: f64, min_volume: f64) -> f64 {
    let denom = volume.max(min_volume * VOLUME_SATURATION);
    if denom <= 0.0 || !denom.is_finite() {
        return 0.0;
    }
    (volume / denom).clamp(0.0, 1.0)
}

/// Composite noise score in [0,1], rounded to 4 decimals.
pub fn noise_score(signals: &SignalSnapshot, weights: &WeightVector, min_volume: f64) -> f64 {
    let s = signals.sanitized();
    let w = weights.as_array();
    let components = [
        1.0 - s.ack_rate,
        s.suspected_false_rate,
        volume_norm(s.volume, min_volume),
        1.0 - s.dedup_ratio,
        1.0 - s.escalation_effectiveness,
    ];
    let raw: f64 = w.iter().zip(components.iter()).map(|(w, c)| w * c).sum();
    if !raw.is_finite() {
        return 0.0;
    }
    (raw.clamp(0.0, 1.0) * 10_000.0).round() / 10_000.0
}
