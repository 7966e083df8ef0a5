use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use governance::{AlertRecord, GovernanceConfig};

/// Resolved daemon settings.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub governance: GovernanceConfig,
    /// Where snapshots, audit logs and the alert store live; `None` keeps
    /// everything in memory.
    pub state_dir: Option<PathBuf>,
}

impl DaemonConfig {
    /// Load from an optional TOML file (else defaults), apply `GOVERNOR_*`
    /// overrides, then let a CLI state directory win over both.
    pub fn resolve(config_path: Option<&Path>, state_dir: Option<PathBuf>) -> Result<Self> {
        let mut governance = match config_path {
            Some(path) => GovernanceConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => GovernanceConfig::from_env().context("Invalid GOVERNOR_* environment")?,
        };
        if let Some(dir) = state_dir {
            governance.persistence.state_dir = Some(dir);
        }
        let state_dir = governance.persistence.state_dir.clone();
        Ok(Self {
            governance,
            state_dir,
        })
    }

    pub fn alert_store_path(&self) -> Option<PathBuf> {
        self.state_dir.as_ref().map(|dir| dir.join("alerts.json"))
    }

    pub fn snapshot_dir(&self) -> Option<PathBuf> {
        self.state_dir.as_ref().map(|dir| dir.join("snapshots"))
    }
}

/// Read a JSON array of alerts to register at startup.
pub fn load_alerts(path: &Path) -> Result<Vec<AlertRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read alerts from {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse alerts in {}", path.display()))
}
