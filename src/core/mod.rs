pub mod error;
pub mod types;

pub use error::{Result, ServerError};
pub use types::{DEFAULT_MODEL_VERSION, ModelDeployment, ServerState, SnapshotKind};
