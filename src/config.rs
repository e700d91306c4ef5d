use crate::snapshot::DEFAULT_QUEUE_CAPACITY;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Startup configuration of the model server.
///
/// Values normally come from the command line; see `src/main.rs`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory of deployable model archives
    pub model_store: PathBuf,

    /// Snapshot to restore instead of the latest one in `snapshot_dir`
    pub snapshot_file: Option<PathBuf>,

    /// Skip every snapshot write; reads still work
    pub disable_snapshots: bool,

    /// Where snapshot files are kept
    pub snapshot_dir: PathBuf,

    /// Where the log and metric sink files are created
    pub log_dir: PathBuf,

    /// How long shutdown waits for pending snapshot writes
    pub shutdown_grace: Duration,

    /// Capacity of the snapshot capture queue.
    ///
    /// Management calls enqueue their snapshot while holding the state lock.
    /// When the writer falls this far behind, the next management call waits
    /// for a free slot and every other caller, `list_models` included, waits
    /// behind it. Nothing is dropped.
    pub queue_capacity: usize,
}

impl ServerConfig {
    /// Configuration with the default `logs/` layout relative to the working
    /// directory.
    pub fn new<P: AsRef<Path>>(model_store: P) -> Self {
        let log_dir = PathBuf::from("logs");
        Self {
            model_store: model_store.as_ref().to_path_buf(),
            snapshot_file: None,
            disable_snapshots: false,
            snapshot_dir: log_dir.join("config"),
            log_dir,
            shutdown_grace: Duration::from_secs(5),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Place logs under `log_dir` and snapshots under `log_dir/config`.
    pub fn log_dir<P: AsRef<Path>>(mut self, log_dir: P) -> Self {
        self.log_dir = log_dir.as_ref().to_path_buf();
        self.snapshot_dir = self.log_dir.join("config");
        self
    }

    /// Override the snapshot directory
    pub fn snapshot_dir<P: AsRef<Path>>(mut self, snapshot_dir: P) -> Self {
        self.snapshot_dir = snapshot_dir.as_ref().to_path_buf();
        self
    }

    /// Restore from this snapshot file
    pub fn snapshot_file<P: AsRef<Path>>(mut self, snapshot_file: P) -> Self {
        self.snapshot_file = Some(snapshot_file.as_ref().to_path_buf());
        self
    }

    pub fn disable_snapshots(mut self, disabled: bool) -> Self {
        self.disable_snapshots = disabled;
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}
