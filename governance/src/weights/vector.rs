//! Weight vector — the five scoring weights shared by scorer and controller
//!
//! Invariant after every mutation: each component lies in `[w_min, w_max]`
//! and the components sum to 1. [`WeightVector::normalize_bounded`] is the
//! only path that produces a vector satisfying both at once.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// Number of weight components.
pub const WEIGHT_COUNT: usize = 5;

/// Tolerance used when checking Σw = 1.
pub const SUM_TOLERANCE: f64 = 1e-6;

const NORMALIZE_ITERATIONS: usize = 100;

/// Component index, in scorer order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightComponent {
    /// w1 — weights `1 - ack_rate`.
    Unacked,
    /// w2 — weights `suspected_false_rate`.
    SuspectedFalse,
    /// w3 — weights normalized volume.
    Volume,
    /// w4 — weights `1 - dedup_ratio`.
    Duplication,
    /// w5 — weights `1 - escalation_effectiveness`.
    IneffectiveEscalation,
}

impl WeightComponent {
    pub fn index(self) -> usize {
        match self {
            Self::Unacked => 0,
            Self::SuspectedFalse => 1,
            Self::Volume => 2,
            Self::Duplication => 3,
            Self::IneffectiveEscalation => 4,
        }
    }
}

/// Five non-negative weights summing to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightVector([f64; WEIGHT_COUNT]);

impl WeightVector {
    /// Build from raw components without normalizing.
    pub const fn from_array(values: [f64; WEIGHT_COUNT]) -> Self {
        Self(values)
    }

    pub fn as_array(&self) -> &[f64; WEIGHT_COUNT] {
        &self.0
    }

    pub fn get(&self, component: WeightComponent) -> f64 {
        self.0[component.index()]
    }

    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }

    /// Whether the vector satisfies the bounds and unit-sum invariant.
    pub fn is_valid(&self, w_min: f64, w_max: f64) -> bool {
        (self.sum() - 1.0).abs() <= SUM_TOLERANCE
            && self
                .0
                .iter()
                .all(|w| w.is_finite() && *w >= w_min - 1e-9 && *w <= w_max + 1e-9)
    }

    /// L1 distance between two vectors.
    pub fn l1_distance(&self, other: &WeightVector) -> f64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b).abs())
            .sum()
    }

    /// Add per-component deltas (no normalization).
    pub fn with_deltas(&self, deltas: &[f64; WEIGHT_COUNT]) -> Self {
        let mut out = self.0;
        for (w, d) in out.iter_mut().zip(deltas.iter()) {
            *w += d;
        }
        Self(out)
    }

    /// Clamp every component to `[w_min, w_max]` and renormalize to Σ = 1.
    ///
    /// Euclidean projection onto the bounded simplex: finds the shift `μ`
    /// with `Σ clamp(w_i + μ, w_min, w_max) = 1` by bisection. `f(μ)` is
    /// monotone and spans `[5·w_min, 5·w_max]`, so a root exists whenever
    /// `5·w_min ≤ 1 ≤ 5·w_max` (enforced by config validation).
    pub fn normalize_bounded(&self, w_min: f64, w_max: f64) -> Self {
        let w = self.0.map(|v| if v.is_finite() { v.max(0.0) } else { 0.0 });
        let shifted = |mu: f64| -> f64 { w.iter().map(|v| (v + mu).clamp(w_min, w_max)).sum() };

        let largest = w.iter().cloned().fold(0.0_f64, f64::max);
        let smallest = w.iter().cloned().fold(f64::INFINITY, f64::min);
        let mut lo = w_min - largest;
        let mut hi = w_max - smallest;
        for _ in 0..NORMALIZE_ITERATIONS {
            let mid = 0.5 * (lo + hi);
            if shifted(mid) < 1.0 {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        let mu = 0.5 * (lo + hi);
        Self(w.map(|v| (v + mu).clamp(w_min, w_max)))
    }

    /// Apply a partial override then re-establish the invariant.
    pub fn apply_override(&self, partial: &WeightOverride, w_min: f64, w_max: f64) -> Self {
        let mut out = self.0;
        for (slot, value) in out.iter_mut().zip(partial.as_options()) {
            if let Some(v) = value {
                *slot = v;
            }
        }
        Self(out).normalize_bounded(w_min, w_max)
    }
}

impl Default for WeightVector {
    /// Default scorer weights: ack deficit dominates, the rest share evenly.
    fn default() -> Self {
        Self([0.30, 0.25, 0.15, 0.15, 0.15])
    }
}

impl std::fmt::Display for WeightVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{:.4}, {:.4}, {:.4}, {:.4}, {:.4}]",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4]
        )
    }
}

/// Partial runtime override for [`WeightVector`] (`set_weights`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightOverride {
    #[serde(default)]
    pub w1: Option<f64>,
    #[serde(default)]
    pub w2: Option<f64>,
    #[serde(default)]
    pub w3: Option<f64>,
    #[serde(default)]
    pub w4: Option<f64>,
    #[serde(default)]
    pub w5: Option<f64>,
}

impl WeightOverride {
    pub fn as_options(&self) -> [Option<f64>; WEIGHT_COUNT] {
        [self.w1, self.w2, self.w3, self.w4, self.w5]
    }

    pub fn is_empty(&self) -> bool {
        self.as_options().iter().all(Option::is_none)
    }
}

/// Global weight vector handle: one writer (the controller), many readers.
///
/// Readers get a copy, so a scorer never observes a half-written vector.
#[derive(Debug, Clone)]
pub struct SharedWeights {
    inner: Arc<RwLock<WeightVector>>,
}

impl SharedWeights {
    pub fn new(initial: WeightVector) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Atomic copy of the current vector.
    pub fn snapshot(&self) -> WeightVector {
        *self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn store(&self, weights: WeightVector) {
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = weights;
    }
}
