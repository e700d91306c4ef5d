use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use modelsnap::{SnapshotKind, SnapshotRecord, SnapshotStore, resolve, telemetry};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "snapshot-tool")]
#[command(about = "Inspect modelsnap configuration snapshots")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List snapshot files, oldest first
    List {
        #[arg(long, default_value = "logs/config")]
        dir: PathBuf,
        #[arg(long)]
        kind: Option<String>,
    },
    /// Print the deployments recorded in a snapshot
    Show { path: PathBuf },
    /// Validate a snapshot file; exits non-zero if it would not restore
    Check { path: PathBuf },
    /// Report which snapshot a server would restore on startup
    Resolve {
        #[arg(long, default_value = "logs/config")]
        dir: PathBuf,
        #[arg(long)]
        snapshot_file: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    telemetry::init_simple_logging("warn")?;
    let cli = Cli::parse();

    match cli.command {
        Command::List { dir, kind } => list(&dir, kind.as_deref()),
        Command::Show { path } => show(&path),
        Command::Check { path } => check(&path),
        Command::Resolve { dir, snapshot_file } => {
            let store = SnapshotStore::open(&dir, true);
            let recovery = resolve(snapshot_file.as_deref(), &store);
            println!("Outcome: {:?}", recovery.outcome);
            println!("Models: {}", recovery.state.model_count());
            Ok(())
        }
    }
}

fn list(dir: &Path, kind: Option<&str>) -> Result<()> {
    let filter = kind
        .map(|label| {
            SnapshotKind::from_label(label)
                .ok_or_else(|| anyhow!("Unknown kind '{}'. Expected startup, shutdown or snapshot", label))
        })
        .transpose()?;

    let store = SnapshotStore::open(dir, true);
    for meta in store.list_snapshots() {
        if filter.is_some_and(|kind| kind != meta.kind) {
            continue;
        }
        println!(
            "{:>10}  {:<8}  {}  {}",
            meta.sequence,
            meta.kind,
            meta.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            meta.file_name()
        );
    }
    Ok(())
}

fn read(path: &Path) -> Result<SnapshotRecord> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    SnapshotStore::open(dir, false)
        .read(path)
        .with_context(|| format!("Failed to load snapshot '{}'", path.display()))
}

fn show(path: &Path) -> Result<()> {
    let record = read(path)?;
    println!("Snapshot: {}", path.display());
    println!("Kind: {}", record.kind);
    println!("Sequence: {}", record.sequence);
    println!("Timestamp: {}", record.timestamp.to_rfc3339());
    if let Some(model_store) = record.state.model_store() {
        println!("Model store: {}", model_store.display());
    }

    if record.state.is_empty() {
        println!("No models registered");
        return Ok(());
    }
    for deployment in record.state.deployments() {
        println!(
            "- {} v{}{} workers={} (min={}, max={}) <- {}",
            deployment.model_name,
            deployment.version,
            if deployment.default_version { " [default]" } else { "" },
            deployment.worker_count,
            deployment.min_workers,
            deployment.max_workers,
            deployment.artifact_location
        );
    }
    Ok(())
}

fn check(path: &Path) -> Result<()> {
    let record = read(path)?;
    println!(
        "Snapshot: {} OK ({} models, kind={}, sequence={})",
        path.display(),
        record.state.model_count(),
        record.kind,
        record.sequence
    );
    Ok(())
}
