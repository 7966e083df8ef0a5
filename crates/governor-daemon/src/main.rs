use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use governance::persistence::SharedPersistenceGateway;
use governance::store::SharedAlertStore;
use governance::{AlertGovernor, InMemoryAlertStore, JsonFileAlertStore, JsonFileGateway};
use governor_daemon::config::load_alerts;
use governor_daemon::{DaemonConfig, FileSignalSource};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file (defaults plus GOVERNOR_* environment otherwise)
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON file mapping group id to its current signals
    #[arg(long)]
    signals: PathBuf,

    /// JSON array of alerts to register at startup
    #[arg(long)]
    alerts: Option<PathBuf>,

    /// Directory for snapshots, audit logs and the alert store (overrides config)
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Run each sweep once, print the results and exit
    #[arg(long, default_value_t = false)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,governance=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = DaemonConfig::resolve(args.config.as_deref(), args.state_dir.clone())?;

    let store: SharedAlertStore = match config.alert_store_path() {
        Some(path) => Arc::new(
            JsonFileAlertStore::open(&path)
                .with_context(|| format!("Failed to open alert store {}", path.display()))?,
        ),
        None => Arc::new(InMemoryAlertStore::new()),
    };

    let signals = Arc::new(FileSignalSource::new(&args.signals));
    if let Err(e) = signals.refresh().await {
        warn!(error = %e, "Signal file not readable yet, starting with no groups");
    }

    let mut governor = AlertGovernor::new(config.governance.clone(), store, signals)
        .context("Invalid governance configuration")?;
    if let Some(dir) = config.snapshot_dir() {
        let gateway: SharedPersistenceGateway = Arc::new(
            JsonFileGateway::open(&dir)
                .await
                .with_context(|| format!("Failed to open state directory {}", dir.display()))?,
        );
        governor = governor.with_gateway(gateway);
    }
    let governor = governor.shared();

    let restored = governor.restore().await;
    info!(
        weights_restored = restored.weights_restored,
        groups_restored = restored.groups_restored,
        state_dir = ?config.state_dir,
        "Alert governor starting"
    );

    if let Some(path) = &args.alerts {
        let alerts = load_alerts(path)?;
        let count = alerts.len();
        for alert in alerts {
            governor.register_alert(alert)?;
        }
        info!(count, "Alerts registered");
    }

    if args.once {
        let now = Utc::now();
        let batch = governor.run_suppression_sweep(now).await?;
        let tuning = governor.run_tuning_cycle(now).await?;
        let escalation = governor.run_escalation_sweep(now).await?;
        let summary = serde_json::json!({
            "suppression": batch,
            "tuning": tuning,
            "escalation": escalation,
            "weights": governor.weights(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        let cancel = CancellationToken::new();
        let handles = governor.spawn_sweeps(cancel.clone());

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        info!("Shutdown requested");
        cancel.cancel();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Sweep task ended abnormally");
            }
        }
    }

    if !governor.save_snapshots().await {
        warn!("Final snapshot save failed; state since the last successful save is lost");
    }
    info!("Alert governor stopped");
    Ok(())
}
