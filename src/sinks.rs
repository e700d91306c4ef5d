use crate::core::{Result, ServerError};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

/// Log and metric files the server writes to. Their content is produced
/// elsewhere; they only have to exist and be writable once the server runs.
pub const SINK_FILES: [&str; 5] = [
    "access_log.log",
    "model_log.log",
    "ts_log.log",
    "model_metrics.log",
    "ts_metrics.log",
];

/// Creates `log_dir` and every sink file in it, opening each for append to
/// prove it is writable. Existing content is kept.
pub fn ensure_sinks(log_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(log_dir).map_err(|e| {
        ServerError::Io(format!("Failed to create log directory {}: {}", log_dir.display(), e))
    })?;

    SINK_FILES
        .iter()
        .map(|name| {
            let path = log_dir.join(name);
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| ServerError::Io(format!("Failed to open {}: {}", path.display(), e)))?;
            Ok(path)
        })
        .collect()
}
