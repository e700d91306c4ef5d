use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("Snapshot '{}' not found", .0.display())]
    SnapshotNotFound(PathBuf),

    #[error("Snapshot '{}' already exists", .0.display())]
    SnapshotExists(PathBuf),

    #[error("Invalid server state: {0}")]
    InvalidState(String),

    #[error("Model '{0}' already registered")]
    ModelExists(String),

    #[error("Model '{0}' not found")]
    ModelNotFound(String),

    #[error("Invalid lifecycle transition: {0}")]
    InvalidLifecycle(String),

    #[error("Snapshot writer closed")]
    WriterClosed,
}

impl ServerError {
    /// Malformed or semantically invalid snapshot content.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::CorruptSnapshot(_) | Self::InvalidState(_))
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
