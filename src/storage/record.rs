use crate::core::{ServerState, SnapshotKind};
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use std::path::{Path, PathBuf};

const FILE_STAMP_FORMAT: &str = "%Y%m%d%H%M%S%3f";
const FILE_STAMP_LEN: usize = 17;
const SEQUENCE_WIDTH: usize = 10;

/// A point-in-time capture of the server state. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub kind: SnapshotKind,
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
    pub state: ServerState,
}

impl SnapshotRecord {
    /// Stamps the record with the current time, truncated to the millisecond
    /// precision the file format keeps.
    pub fn new(kind: SnapshotKind, sequence: u64, state: ServerState) -> Self {
        Self::at(kind, Utc::now(), sequence, state)
    }

    pub fn at(kind: SnapshotKind, timestamp: DateTime<Utc>, sequence: u64, state: ServerState) -> Self {
        Self {
            kind,
            timestamp: timestamp.trunc_subsecs(3),
            sequence,
            state,
        }
    }

    /// `{yyyyMMddHHmmssSSS}-{sequence}-{suffix}`; lexicographic order is
    /// chronological order.
    pub fn file_name(&self) -> String {
        format!(
            "{}-{:0width$}-{}",
            self.timestamp.format(FILE_STAMP_FORMAT),
            self.sequence,
            self.kind.file_suffix(),
            width = SEQUENCE_WIDTH
        )
    }

    pub fn meta(&self, dir: &Path) -> SnapshotMeta {
        SnapshotMeta {
            path: dir.join(self.file_name()),
            kind: self.kind,
            timestamp: self.timestamp,
            sequence: self.sequence,
        }
    }
}

/// What the store knows about a snapshot file from its name alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotMeta {
    pub path: PathBuf,
    pub kind: SnapshotKind,
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
}

impl SnapshotMeta {
    /// Returns `None` for anything that is not a snapshot file name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let mut parts = name.splitn(3, '-');
        let stamp = parts.next()?;
        let sequence = parts.next()?;
        let suffix = parts.next()?;

        if stamp.len() != FILE_STAMP_LEN || !stamp.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if sequence.is_empty() || !sequence.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let kind = SnapshotKind::from_file_suffix(suffix)?;
        let timestamp = NaiveDateTime::parse_from_str(stamp, FILE_STAMP_FORMAT)
            .ok()?
            .and_utc();

        Some(Self {
            path: path.to_path_buf(),
            kind,
            timestamp,
            sequence: sequence.parse().ok()?,
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 5).unwrap() + chrono::Duration::milliseconds(42)
    }

    #[test]
    fn test_file_name_layout() {
        let record = SnapshotRecord::at(SnapshotKind::Change, stamp(), 7, ServerState::new());
        assert_eq!(record.file_name(), "20261016093005042-0000000007-snapshot.cfg");
    }

    #[test]
    fn test_meta_parses_generated_name() {
        let record = SnapshotRecord::at(SnapshotKind::Startup, stamp(), 12, ServerState::new());
        let dir = Path::new("/var/lib/modelsnap/config");

        let meta = SnapshotMeta::from_path(&dir.join(record.file_name())).unwrap();
        assert_eq!(meta, record.meta(dir));
    }

    #[test]
    fn test_meta_rejects_foreign_names() {
        for name in [
            "README.md",
            "junk-snapshot.cfg",
            "20261016093005042-0000000007-snapshot.cfg.tmp",
            "2026101609300504-0000000007-snapshot.cfg",
            "20261016093005042-x7-snapshot.cfg",
            "20261016093005042-0000000007-config.cfg",
        ] {
            assert!(SnapshotMeta::from_path(Path::new(name)).is_none(), "{} accepted", name);
        }
    }

    #[test]
    fn test_names_sort_chronologically() {
        let earlier = SnapshotRecord::at(SnapshotKind::Shutdown, stamp(), 99, ServerState::new());
        let later = SnapshotRecord::at(
            SnapshotKind::Change,
            stamp() + chrono::Duration::milliseconds(1),
            100,
            ServerState::new(),
        );
        assert!(earlier.file_name() < later.file_name());
    }
}
