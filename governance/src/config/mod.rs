//! Governance configuration
//!
//! All subsystems receive their configuration at construction. Every field
//! has a default so a partial TOML file is enough; `GOVERNOR_*` environment
//! variables override a handful of operational knobs. [`GovernanceConfig::validate`]
//! runs before any subsystem is built and rejects inconsistent settings
//! instead of letting the engine start in a degenerate state.
//!
//! ```toml
//! [suppression.hysteresis]
//! high = 0.6
//! low = 0.4
//!
//! [weights]
//! w_min = 0.05
//! w_max = 0.6
//!
//! [escalation.base_sla_ms]
//! critical = 300000
//! high = 900000
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::signals::Severity;
use crate::weights::vector::{WeightVector, WEIGHT_COUNT};

/// Longest SLA or cooldown accepted (30 days).
pub const MAX_ESCALATION_MS: u64 = 30 * 24 * 60 * 60 * 1000;

/// Error raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {field}: {message}")]
    Invalid { field: String, message: String },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// ============================================================================
// Suppression
// ============================================================================

/// Static hysteresis thresholds on the noise score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HysteresisConfig {
    pub high: f64,
    pub low: f64,
}

impl Default for HysteresisConfig {
    fn default() -> Self {
        Self {
            high: 0.6,
            low: 0.4,
        }
    }
}

/// Robust (median/MAD) threshold estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobustConfig {
    pub enabled: bool,
    /// Rolling history cap per group.
    pub history_size: usize,
    /// Samples needed before dynamic thresholds replace the static ones.
    pub min_samples_for_robust: usize,
    pub k_high: f64,
    pub k_low: f64,
    /// Floor applied to MAD.
    pub epsilon_mad: f64,
    /// Consecutive cycles at/above high required when the dynamic high is
    /// below the static high.
    pub min_consecutive_above_high: u32,
}

impl Default for RobustConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            history_size: 50,
            min_samples_for_robust: 10,
            k_high: 3.0,
            k_low: 1.0,
            epsilon_mad: 0.01,
            min_consecutive_above_high: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuppressionConfig {
    pub hysteresis: HysteresisConfig,
    /// Minimum volume before a group may enter CANDIDATE or SUPPRESSED.
    pub min_volume: f64,
    /// Scorer weights; seeds the controller unless it has its own initial vector.
    pub weights: WeightVector,
    /// Escalation effectiveness at or above which suppression is blocked.
    pub escalation_effectiveness_block_threshold: f64,
    pub allow_suppress_critical: bool,
    /// Severity tier protected unless `allow_suppress_critical` is set.
    pub protected_severity: Severity,
    pub robust: RobustConfig,
    /// Consecutive below-low cycles in MONITORING before returning to ACTIVE.
    pub stable_recovery_windows: u32,
    /// Post-exit ack-rate jump that marks an exit as a suspected false suppression.
    pub recovery_ack_rate_jump: f64,
    /// Ack samples collected after leaving SUPPRESSED before judging the exit.
    pub post_exit_ack_samples: usize,
    /// Bounded transition log capacity.
    pub transition_log_size: usize,
}

impl Default for SuppressionConfig {
    fn default() -> Self {
        Self {
            hysteresis: HysteresisConfig::default(),
            min_volume: 5.0,
            weights: WeightVector::default(),
            escalation_effectiveness_block_threshold: 0.8,
            allow_suppress_critical: false,
            protected_severity: Severity::Critical,
            robust: RobustConfig::default(),
            stable_recovery_windows: 3,
            recovery_ack_rate_jump: 0.2,
            post_exit_ack_samples: 3,
            transition_log_size: 1_000,
        }
    }
}

impl SuppressionConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        let h = &self.hysteresis;
        unit_interval("suppression.hysteresis.high", h.high)?;
        unit_interval("suppression.hysteresis.low", h.low)?;
        if h.low > h.high {
            return Err(ConfigError::invalid(
                "suppression.hysteresis",
                format!("low ({}) must not exceed high ({})", h.low, h.high),
            ));
        }
        non_negative("suppression.min_volume", self.min_volume)?;
        unit_interval(
            "suppression.escalation_effectiveness_block_threshold",
            self.escalation_effectiveness_block_threshold,
        )?;
        unit_interval(
            "suppression.recovery_ack_rate_jump",
            self.recovery_ack_rate_jump,
        )?;
        if self.weights.as_array().iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::invalid(
                "suppression.weights",
                "weights must be finite and non-negative",
            ));
        }
        if self.stable_recovery_windows == 0 {
            return Err(ConfigError::invalid(
                "suppression.stable_recovery_windows",
                "must be at least 1",
            ));
        }
        if self.transition_log_size == 0 {
            return Err(ConfigError::invalid(
                "suppression.transition_log_size",
                "must be at least 1",
            ));
        }

        let r = &self.robust;
        if r.history_size == 0 {
            return Err(ConfigError::invalid(
                "suppression.robust.history_size",
                "must be at least 1",
            ));
        }
        if r.min_samples_for_robust == 0 || r.min_samples_for_robust > r.history_size {
            return Err(ConfigError::invalid(
                "suppression.robust.min_samples_for_robust",
                format!("must be in 1..={}", r.history_size),
            ));
        }
        finite("suppression.robust.k_high", r.k_high)?;
        finite("suppression.robust.k_low", r.k_low)?;
        if r.k_low > r.k_high {
            return Err(ConfigError::invalid(
                "suppression.robust",
                format!("k_low ({}) must not exceed k_high ({})", r.k_low, r.k_high),
            ));
        }
        positive("suppression.robust.epsilon_mad", r.epsilon_mad)?;
        if r.min_consecutive_above_high == 0 {
            return Err(ConfigError::invalid(
                "suppression.robust.min_consecutive_above_high",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Adaptive weights
// ============================================================================

/// SLA targets the weight controller steers toward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlaTargets {
    pub ack_rate: f64,
    pub escalation_effectiveness: f64,
    pub false_suppression_rate: f64,
    pub suspected_false_rate: f64,
    pub re_noise_rate: f64,
}

impl Default for SlaTargets {
    fn default() -> Self {
        Self {
            ack_rate: 0.6,
            escalation_effectiveness: 0.7,
            false_suppression_rate: 0.05,
            suspected_false_rate: 0.2,
            re_noise_rate: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveWeightConfig {
    /// Initial weights; falls back to `suppression.weights` when unset.
    pub initial_weights: Option<WeightVector>,
    pub w_min: f64,
    pub w_max: f64,
    /// Gain applied to each error before clamping.
    pub adjust_factor: f64,
    /// Per-component delta clamp.
    pub max_delta: f64,
    pub deadband: f64,
    pub cooldown_cycles: u64,
    /// Cap on the L1 norm of all deltas in one cycle.
    pub max_cycle_drift: f64,
    pub targets: SlaTargets,
    pub outlier_mad_k: f64,
    pub history_size: usize,
    pub convergence_window: usize,
    pub convergence_threshold: f64,
    pub stable_freeze_cycles: u32,
    pub severe_deviation_threshold: f64,
    pub min_freeze_hold_cycles: u64,
}

impl Default for AdaptiveWeightConfig {
    fn default() -> Self {
        Self {
            initial_weights: None,
            w_min: 0.05,
            w_max: 0.6,
            adjust_factor: 0.1,
            max_delta: 0.05,
            deadband: 0.02,
            cooldown_cycles: 3,
            max_cycle_drift: 0.1,
            targets: SlaTargets::default(),
            outlier_mad_k: 3.5,
            history_size: 50,
            convergence_window: 5,
            convergence_threshold: 0.01,
            stable_freeze_cycles: 3,
            severe_deviation_threshold: 0.3,
            min_freeze_hold_cycles: 5,
        }
    }
}

impl AdaptiveWeightConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        finite("weights.w_min", self.w_min)?;
        finite("weights.w_max", self.w_max)?;
        if self.w_min < 0.0 {
            return Err(ConfigError::invalid("weights.w_min", "must be non-negative"));
        }
        if self.w_min > self.w_max {
            return Err(ConfigError::invalid(
                "weights",
                format!("w_min ({}) must not exceed w_max ({})", self.w_min, self.w_max),
            ));
        }
        let n = WEIGHT_COUNT as f64;
        if self.w_min * n > 1.0 + 1e-9 || self.w_max * n < 1.0 - 1e-9 {
            return Err(ConfigError::invalid(
                "weights",
                format!(
                    "bounds [{}, {}] cannot hold {} weights summing to 1",
                    self.w_min, self.w_max, WEIGHT_COUNT
                ),
            ));
        }
        if let Some(initial) = &self.initial_weights {
            if initial.as_array().iter().any(|w| !w.is_finite() || *w < 0.0) {
                return Err(ConfigError::invalid(
                    "weights.initial_weights",
                    "weights must be finite and non-negative",
                ));
            }
        }
        positive("weights.adjust_factor", self.adjust_factor)?;
        positive("weights.max_delta", self.max_delta)?;
        non_negative("weights.deadband", self.deadband)?;
        positive("weights.max_cycle_drift", self.max_cycle_drift)?;
        positive("weights.outlier_mad_k", self.outlier_mad_k)?;
        non_negative("weights.convergence_threshold", self.convergence_threshold)?;
        positive(
            "weights.severe_deviation_threshold",
            self.severe_deviation_threshold,
        )?;
        if self.history_size == 0 {
            return Err(ConfigError::invalid("weights.history_size", "must be at least 1"));
        }
        if self.convergence_window == 0 || self.convergence_window > self.history_size {
            return Err(ConfigError::invalid(
                "weights.convergence_window",
                format!("must be in 1..={}", self.history_size),
            ));
        }
        if self.stable_freeze_cycles == 0 {
            return Err(ConfigError::invalid(
                "weights.stable_freeze_cycles",
                "must be at least 1",
            ));
        }
        let t = &self.targets;
        unit_interval("weights.targets.ack_rate", t.ack_rate)?;
        unit_interval(
            "weights.targets.escalation_effectiveness",
            t.escalation_effectiveness,
        )?;
        unit_interval(
            "weights.targets.false_suppression_rate",
            t.false_suppression_rate,
        )?;
        unit_interval("weights.targets.suspected_false_rate", t.suspected_false_rate)?;
        unit_interval("weights.targets.re_noise_rate", t.re_noise_rate)?;
        Ok(())
    }

    /// Effective starting vector, already clamped and normalized.
    pub fn starting_weights(&self, fallback: &WeightVector) -> WeightVector {
        self.initial_weights
            .unwrap_or(*fallback)
            .normalize_bounded(self.w_min, self.w_max)
    }
}

// ============================================================================
// Escalation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    pub run_interval_ms: u64,
    /// Base SLA per severity; its keys are the escalation-eligible severities.
    pub base_sla_ms: BTreeMap<Severity, u64>,
    /// Latency samples needed before the percentile threshold is trusted.
    pub n_min_samples: usize,
    pub cooldown_min_ms: u64,
    pub cooldown_max_ms: u64,
    /// An escalation is effective when acked within `factor · threshold`.
    pub effectiveness_window_factor: f64,
    /// An escalation is suspected false when acked within `factor · threshold`.
    pub suspected_false_factor: f64,
    /// Most recent latency samples kept per severity.
    pub max_latency_samples: usize,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        let mut base_sla_ms = BTreeMap::new();
        base_sla_ms.insert(Severity::Critical, 5 * 60_000);
        base_sla_ms.insert(Severity::High, 15 * 60_000);
        base_sla_ms.insert(Severity::Medium, 60 * 60_000);
        Self {
            run_interval_ms: 60_000,
            base_sla_ms,
            n_min_samples: 20,
            cooldown_min_ms: 5 * 60_000,
            cooldown_max_ms: 60 * 60_000,
            effectiveness_window_factor: 1.0,
            suspected_false_factor: 0.2,
            max_latency_samples: 500,
        }
    }
}

impl EscalationConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.run_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "escalation.run_interval_ms",
                "must be positive",
            ));
        }
        if self.base_sla_ms.is_empty() {
            return Err(ConfigError::invalid(
                "escalation.base_sla_ms",
                "at least one severity must be escalation-eligible",
            ));
        }
        if let Some((sev, _)) = self.base_sla_ms.iter().find(|(_, ms)| **ms == 0) {
            return Err(ConfigError::invalid(
                format!("escalation.base_sla_ms.{sev}"),
                "must be positive",
            ));
        }
        if let Some((sev, ms)) = self
            .base_sla_ms
            .iter()
            .find(|(_, ms)| **ms > MAX_ESCALATION_MS)
        {
            return Err(ConfigError::invalid(
                format!("escalation.base_sla_ms.{sev}"),
                format!("{ms} exceeds the {MAX_ESCALATION_MS} ms limit"),
            ));
        }
        if self.cooldown_max_ms > MAX_ESCALATION_MS {
            return Err(ConfigError::invalid(
                "escalation.cooldown_max_ms",
                format!(
                    "{} exceeds the {MAX_ESCALATION_MS} ms limit",
                    self.cooldown_max_ms
                ),
            ));
        }
        if self.cooldown_min_ms > self.cooldown_max_ms {
            return Err(ConfigError::invalid(
                "escalation",
                format!(
                    "cooldown_min_ms ({}) must not exceed cooldown_max_ms ({})",
                    self.cooldown_min_ms, self.cooldown_max_ms
                ),
            ));
        }
        positive(
            "escalation.effectiveness_window_factor",
            self.effectiveness_window_factor,
        )?;
        non_negative("escalation.suspected_false_factor", self.suspected_false_factor)?;
        if self.max_latency_samples == 0 {
            return Err(ConfigError::invalid(
                "escalation.max_latency_samples",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Severities the sweep considers.
    pub fn eligible_severities(&self) -> Vec<Severity> {
        self.base_sla_ms.keys().copied().collect()
    }
}

// ============================================================================
// Scheduling and persistence
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub suppression_interval_ms: u64,
    pub tuning_interval_ms: u64,
    pub signal_timeout_ms: u64,
    pub persistence_timeout_ms: u64,
    /// Window over which SLA metrics feed the weight controller.
    pub metrics_window_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            suppression_interval_ms: 30_000,
            tuning_interval_ms: 5 * 60_000,
            signal_timeout_ms: 2_000,
            persistence_timeout_ms: 2_000,
            metrics_window_ms: 60 * 60_000,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        for (field, value) in [
            ("scheduler.suppression_interval_ms", self.suppression_interval_ms),
            ("scheduler.tuning_interval_ms", self.tuning_interval_ms),
            ("scheduler.signal_timeout_ms", self.signal_timeout_ms),
            ("scheduler.persistence_timeout_ms", self.persistence_timeout_ms),
            ("scheduler.metrics_window_ms", self.metrics_window_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be positive"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Directory for snapshots and audit logs; `None` keeps everything in memory.
    pub state_dir: Option<PathBuf>,
}

// ============================================================================
// Top level
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    pub suppression: SuppressionConfig,
    pub weights: AdaptiveWeightConfig,
    pub escalation: EscalationConfig,
    pub scheduler: SchedulerConfig,
    pub persistence: PersistenceConfig,
}

impl GovernanceConfig {
    /// Parse from a TOML string and validate.
    pub fn from_toml_str(raw: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file, apply environment overrides, validate.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&raw)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply `GOVERNOR_*` environment overrides.
    pub fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("GOVERNOR_STATE_DIR") {
            self.persistence.state_dir = Some(PathBuf::from(dir));
        }
        if let Some(ms) = env_u64("GOVERNOR_SUPPRESSION_INTERVAL_MS") {
            self.scheduler.suppression_interval_ms = ms;
        }
        if let Some(ms) = env_u64("GOVERNOR_TUNING_INTERVAL_MS") {
            self.scheduler.tuning_interval_ms = ms;
        }
        if let Some(ms) = env_u64("GOVERNOR_ESCALATION_INTERVAL_MS") {
            self.escalation.run_interval_ms = ms;
        }
        if let Ok(val) = std::env::var("GOVERNOR_ALLOW_SUPPRESS_CRITICAL") {
            self.suppression.allow_suppress_critical = val.to_lowercase() == "true" || val == "1";
        }
        if let Ok(val) = std::env::var("GOVERNOR_ROBUST_ENABLED") {
            self.suppression.robust.enabled = val.to_lowercase() == "true" || val == "1";
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.suppression.validate()?;
        self.weights.validate()?;
        self.escalation.validate()?;
        self.scheduler.validate()?;
        Ok(())
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.parse().ok()
}

fn finite(field: &str, value: f64) -> ConfigResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, "must be finite"))
    }
}

fn positive(field: &str, value: f64) -> ConfigResult<()> {
    finite(field, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, "must be positive"))
    }
}

fn non_negative(field: &str, value: f64) -> ConfigResult<()> {
    finite(field, value)?;
    if value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, "must be non-negative"))
    }
}

fn unit_interval(field: &str, value: f64) -> ConfigResult<()> {
    finite(field, value)?;
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, "must be within [0, 1]"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        GovernanceConfig::default().validate().unwrap();
    }

    #[test]
    fn test_w_min_above_w_max_rejected() {
        let mut config = GovernanceConfig::default();
        config.weights.w_min = 0.5;
        config.weights.w_max = 0.4;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("w_min"), "{err}");
    }

    #[test]
    fn test_infeasible_bounds_rejected() {
        let mut config = GovernanceConfig::default();
        config.weights.w_max = 0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = GovernanceConfig::default();
        config.escalation.run_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = GovernanceConfig::default();
        config.scheduler.signal_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_hysteresis_rejected() {
        let mut config = GovernanceConfig::default();
        config.suppression.hysteresis.low = 0.7;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cooldown_bounds_rejected() {
        let mut config = GovernanceConfig::default();
        config.escalation.cooldown_min_ms = 10;
        config.escalation.cooldown_max_ms = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unbounded_escalation_durations_rejected() {
        let mut config = GovernanceConfig::default();
        config.escalation.cooldown_max_ms = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = GovernanceConfig::default();
        config.escalation.base_sla_ms.insert(Severity::High, u64::MAX);
        assert!(config.validate().is_err());

        let mut config = GovernanceConfig::default();
        config.escalation.cooldown_max_ms = MAX_ESCALATION_MS;
        config.escalation.base_sla_ms.insert(Severity::High, MAX_ESCALATION_MS);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let raw = r#"
[suppression]
min_volume = 12.0

[suppression.hysteresis]
high = 0.7
low = 0.5

[weights]
cooldown_cycles = 4

[escalation.base_sla_ms]
critical = 120000
"#;
        let config = GovernanceConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.suppression.min_volume, 12.0);
        assert_eq!(config.suppression.hysteresis.high, 0.7);
        assert_eq!(config.suppression.robust, RobustConfig::default());
        assert_eq!(config.weights.cooldown_cycles, 4);
        assert_eq!(config.weights.w_min, 0.05);
        assert_eq!(
            config.escalation.eligible_severities(),
            vec![Severity::Critical]
        );
    }

    #[test]
    fn test_weights_parse_from_toml_array() {
        let raw = r#"
[suppression]
weights = [0.2, 0.2, 0.2, 0.2, 0.2]
"#;
        let config = GovernanceConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.suppression.weights.as_array(), &[0.2; 5]);
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        let err = GovernanceConfig::from_toml_str("suppression = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = GovernanceConfig::load(Path::new("/nonexistent/governor.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
