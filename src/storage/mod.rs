pub mod codec;
pub mod record;
pub mod store;

pub use record::{SnapshotMeta, SnapshotRecord};
pub use store::SnapshotStore;
