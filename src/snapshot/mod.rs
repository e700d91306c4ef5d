pub mod writer;

pub use writer::{DEFAULT_QUEUE_CAPACITY, SnapshotWriter, SnapshotWriterStats};
