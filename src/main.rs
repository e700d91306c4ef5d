use anyhow::{Context, Result};
use clap::Parser;
use modelsnap::{LifecycleController, RecoveryOutcome, ServerConfig, shutdown, telemetry};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "modelsnap")]
#[command(about = "Model server with configuration snapshots")]
struct Cli {
    /// Directory of deployable model archives
    #[arg(long)]
    model_store: PathBuf,

    /// Snapshot file to restore instead of the latest one
    #[arg(long, alias = "ts-config")]
    snapshot_file: Option<PathBuf>,

    /// Do not write configuration snapshots
    #[arg(long)]
    no_config_snapshots: bool,

    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Defaults to <log-dir>/config
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: String,

    /// Seconds shutdown waits for pending snapshot writes
    #[arg(long, default_value_t = 5)]
    shutdown_grace: u64,
}

impl Cli {
    fn into_config(self) -> ServerConfig {
        let mut config = ServerConfig::new(&self.model_store)
            .log_dir(&self.log_dir)
            .disable_snapshots(self.no_config_snapshots)
            .shutdown_grace(Duration::from_secs(self.shutdown_grace));
        if let Some(dir) = self.snapshot_dir {
            config = config.snapshot_dir(dir);
        }
        if let Some(file) = self.snapshot_file {
            config = config.snapshot_file(file);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = telemetry::init_logging(&cli.log_level, &cli.log_dir)?;

    let controller = LifecycleController::new(cli.into_config());
    match controller.start().await.context("starting model server")? {
        RecoveryOutcome::Restored { path, .. } => {
            tracing::info!(path = %path.display(), "state restored");
        }
        RecoveryOutcome::Default => tracing::info!("started with default state"),
        RecoveryOutcome::FellBackEmpty(reason) => {
            tracing::warn!(%reason, "snapshot unusable, started with empty state");
        }
    }

    let signal = shutdown::shutdown_signal().await;
    tracing::info!(signal, "shutdown requested");

    controller.stop().await.context("stopping model server")?;
    Ok(())
}
