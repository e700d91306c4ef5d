//! Directory of snapshot files.

use super::codec;
use super::record::{SnapshotMeta, SnapshotRecord};
use crate::core::{Result, ServerError};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

// ============================================================================
// Snapshot Store
// ============================================================================

/// Reads and writes snapshot files in one directory.
///
/// Writes go to a temp file in the same directory and are committed with a
/// no-clobber rename, so readers never see a partial file and an existing
/// snapshot is never replaced. The store never deletes anything.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    enabled: bool,
}

impl SnapshotStore {
    pub fn open<P: AsRef<Path>>(dir: P, enabled: bool) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            enabled,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Persists `record` and returns its path, or `None` when the store is
    /// disabled.
    pub fn write(&self, record: &SnapshotRecord) -> Result<Option<PathBuf>> {
        if !self.enabled {
            return Ok(None);
        }

        fs::create_dir_all(&self.dir).map_err(|e| {
            ServerError::Io(format!("Failed to create snapshot directory {}: {}", self.dir.display(), e))
        })?;

        let target = record.meta(&self.dir).path;
        if target.exists() {
            return Err(ServerError::SnapshotExists(target));
        }

        let text = codec::encode_record(record)?;
        let mut temp = NamedTempFile::new_in(&self.dir)
            .map_err(|e| ServerError::Io(format!("Failed to create temp file: {}", e)))?;
        temp.write_all(text.as_bytes())
            .map_err(|e| ServerError::Io(format!("Failed to write snapshot: {}", e)))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| ServerError::Io(format!("Failed to sync snapshot: {}", e)))?;

        temp.persist_noclobber(&target).map_err(|e| {
            if e.error.kind() == ErrorKind::AlreadyExists {
                ServerError::SnapshotExists(target.clone())
            } else {
                ServerError::Io(format!("Failed to commit snapshot {}: {}", target.display(), e.error))
            }
        })?;

        Ok(Some(target))
    }

    /// Snapshot files oldest first, ordered by sequence number. The timestamp
    /// only breaks ties, so a clock that stepped back between runs cannot
    /// reorder them. A missing or unreadable directory lists as empty; files
    /// that are not snapshots are skipped.
    pub fn list_snapshots(&self) -> Vec<SnapshotMeta> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                if err.kind() != ErrorKind::NotFound {
                    tracing::warn!(dir = %self.dir.display(), error = %err, "snapshot directory unreadable");
                }
                return Vec::new();
            }
        };

        let mut snapshots = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| SnapshotMeta::from_path(&entry.path()))
            .collect::<Vec<_>>();

        snapshots.sort_by(|a, b| {
            a.sequence
                .cmp(&b.sequence)
                .then_with(|| a.timestamp.cmp(&b.timestamp))
                .then_with(|| a.file_name().cmp(&b.file_name()))
        });
        snapshots
    }

    /// Startup or Change snapshot with the highest sequence number.
    pub fn latest(&self) -> Option<SnapshotMeta> {
        self.list_snapshots()
            .into_iter()
            .rev()
            .find(|meta| meta.kind.is_restorable())
    }

    pub fn read<P: AsRef<Path>>(&self, path: P) -> Result<SnapshotRecord> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ServerError::SnapshotNotFound(path.to_path_buf()),
            ErrorKind::InvalidData => {
                ServerError::CorruptSnapshot(format!("{} is not UTF-8 text", path.display()))
            }
            _ => ServerError::Io(format!("Failed to read snapshot {}: {}", path.display(), e)),
        })?;
        codec::decode_record(&text)
    }

    /// One past the highest sequence on disk, so numbering keeps increasing
    /// across restarts.
    pub fn next_sequence(&self) -> u64 {
        self.list_snapshots()
            .iter()
            .map(|meta| meta.sequence)
            .max()
            .map_or(1, |max| max.saturating_add(1))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ModelDeployment, ServerState, SnapshotKind};
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn record(kind: SnapshotKind, sequence: u64) -> SnapshotRecord {
        let mut state = ServerState::new();
        state
            .insert_model("densenet161", vec![ModelDeployment::new("densenet161", "1.0", "densenet161.mar", 1)])
            .unwrap();
        SnapshotRecord::new(kind, sequence, state)
    }

    #[test]
    fn test_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(temp_dir.path().join("config"), true);

        let written = record(SnapshotKind::Change, 1);
        let path = store.write(&written).unwrap().unwrap();

        assert!(path.exists());
        assert_eq!(path, written.meta(store.dir()).path);
        assert_eq!(store.read(&path).unwrap(), written);
        assert_eq!(store.list_snapshots().len(), 1);
    }

    #[test]
    fn test_disabled_store_skips_writes() {
        let temp_dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(temp_dir.path(), false);

        assert!(store.write(&record(SnapshotKind::Startup, 1)).unwrap().is_none());
        assert!(store.list_snapshots().is_empty());
    }

    #[test]
    fn test_never_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(temp_dir.path(), true);

        let first = record(SnapshotKind::Change, 1);
        store.write(&first).unwrap();
        let err = store.write(&first).unwrap_err();
        assert!(matches!(err, ServerError::SnapshotExists(_)));
    }

    #[test]
    fn test_list_is_ordered_and_skips_foreign_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(temp_dir.path(), true);

        store.write(&record(SnapshotKind::Startup, 1)).unwrap();
        store.write(&record(SnapshotKind::Change, 2)).unwrap();
        store.write(&record(SnapshotKind::Shutdown, 3)).unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "operator notes").unwrap();

        let sequences = store.list_snapshots().iter().map(|m| m.sequence).collect::<Vec<_>>();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(store.next_sequence(), 4);
    }

    #[test]
    fn test_latest_ignores_shutdown() {
        let temp_dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(temp_dir.path(), true);

        store.write(&record(SnapshotKind::Startup, 1)).unwrap();
        store.write(&record(SnapshotKind::Change, 2)).unwrap();
        store.write(&record(SnapshotKind::Shutdown, 3)).unwrap();

        let latest = store.latest().unwrap();
        assert_eq!(latest.kind, SnapshotKind::Change);
        assert_eq!(latest.sequence, 2);
    }

    #[test]
    fn test_latest_follows_sequence_not_clock() {
        let temp_dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(temp_dir.path(), true);
        let now = Utc::now();

        // Earlier run with the clock an hour ahead.
        store
            .write(&SnapshotRecord::at(SnapshotKind::Change, now + Duration::hours(1), 5, ServerState::new()))
            .unwrap();
        assert_eq!(store.next_sequence(), 6);
        store
            .write(&SnapshotRecord::at(SnapshotKind::Change, now, 6, record(SnapshotKind::Change, 6).state))
            .unwrap();

        let sequences = store.list_snapshots().iter().map(|m| m.sequence).collect::<Vec<_>>();
        assert_eq!(sequences, vec![5, 6]);
        let latest = store.latest().unwrap();
        assert_eq!(latest.sequence, 6);
        assert_eq!(store.read(&latest.path).unwrap().state.model_names(), vec!["densenet161"]);
    }

    #[test]
    fn test_missing_directory_lists_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(temp_dir.path().join("absent"), true);

        assert!(store.list_snapshots().is_empty());
        assert!(store.latest().is_none());
        assert_eq!(store.next_sequence(), 1);
    }

    #[test]
    fn test_read_missing_and_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(temp_dir.path(), true);

        let missing = store.read(temp_dir.path().join("junk-snapshot.cfg")).unwrap_err();
        assert!(matches!(missing, ServerError::SnapshotNotFound(_)));

        let corrupt_path = temp_dir.path().join("20261016093005042-0000000001-snapshot.cfg");
        fs::write(&corrupt_path, "kind=snapshot\nmodel_snapshot={oops").unwrap();
        assert!(store.read(&corrupt_path).unwrap_err().is_corruption());
    }

    #[test]
    fn test_write_into_file_path_fails() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("config");
        fs::write(&blocker, "not a directory").unwrap();
        let store = SnapshotStore::open(&blocker, true);

        let err = store.write(&record(SnapshotKind::Startup, 1)).unwrap_err();
        assert!(matches!(err, ServerError::Io(_)));
    }
}
