//! Startup selection of the state to restore.
//!
//! Precedence: an explicit snapshot path, then the latest snapshot in an
//! enabled store, then the built-in empty state. Every read failure degrades
//! to the empty state; recovery never fails and never writes.

use crate::core::{ServerError, ServerState, SnapshotKind};
use crate::storage::SnapshotStore;
use std::path::{Path, PathBuf};

/// How the startup state was obtained.
#[derive(Debug)]
pub enum RecoveryOutcome {
    Restored {
        path: PathBuf,
        kind: SnapshotKind,
        sequence: u64,
    },
    /// Nothing to restore: no explicit path and no usable store content.
    Default,
    /// A snapshot was selected but could not be loaded.
    FellBackEmpty(ServerError),
}

impl RecoveryOutcome {
    pub fn is_restored(&self) -> bool {
        matches!(self, Self::Restored { .. })
    }

    pub fn fallback_reason(&self) -> Option<&ServerError> {
        match self {
            Self::FellBackEmpty(reason) => Some(reason),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct Recovery {
    pub state: ServerState,
    pub outcome: RecoveryOutcome,
}

impl Recovery {
    fn empty(outcome: RecoveryOutcome) -> Self {
        Self {
            state: ServerState::new(),
            outcome,
        }
    }
}

pub fn resolve(explicit: Option<&Path>, store: &SnapshotStore) -> Recovery {
    if let Some(path) = explicit {
        return load(path, store);
    }

    if !store.is_enabled() {
        tracing::info!("config snapshots disabled, starting with default state");
        return Recovery::empty(RecoveryOutcome::Default);
    }

    match store.latest() {
        Some(meta) => load(&meta.path, store),
        None => {
            tracing::info!(dir = %store.dir().display(), "no snapshot found, starting with default state");
            Recovery::empty(RecoveryOutcome::Default)
        }
    }
}

fn load(path: &Path, store: &SnapshotStore) -> Recovery {
    match store.read(path) {
        Ok(record) => {
            tracing::info!(
                path = %path.display(),
                kind = %record.kind,
                sequence = record.sequence,
                models = record.state.model_count(),
                "restored server state from snapshot"
            );
            Recovery {
                state: record.state,
                outcome: RecoveryOutcome::Restored {
                    path: path.to_path_buf(),
                    kind: record.kind,
                    sequence: record.sequence,
                },
            }
        }
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "unable to load snapshot, starting with empty state"
            );
            Recovery::empty(RecoveryOutcome::FellBackEmpty(err))
        }
    }
}
