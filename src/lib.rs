// ============================================================================
// modelsnap: configuration snapshots and recovery for a model server
// ============================================================================

//! Durable capture of a model server's registered deployments on startup,
//! shutdown and every management change, and selection of the state to
//! restore when the server boots.
//!
//! # Examples
//!
//! ```no_run
//! use modelsnap::{LifecycleController, ServerConfig};
//!
//! # async fn run() -> modelsnap::Result<()> {
//! let controller = LifecycleController::new(ServerConfig::new("/workspace/model_store"));
//!
//! // Restores the latest snapshot from logs/config, if any.
//! let outcome = controller.start().await?;
//! println!("recovery: {:?}", outcome);
//!
//! controller.register("densenet161", "densenet161.mar", 1).await?;
//! for deployment in controller.list_models().await.deployments() {
//!     println!("{} v{}", deployment.model_name, deployment.version);
//! }
//!
//! controller.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod lifecycle;
pub mod recovery;
pub mod shutdown;
pub mod sinks;
pub mod snapshot;
pub mod storage;
pub mod telemetry;

// Re-export main types for convenience
pub use config::ServerConfig;
pub use core::{DEFAULT_MODEL_VERSION, ModelDeployment, Result, ServerError, ServerState, SnapshotKind};
pub use lifecycle::{LifecycleController, LifecyclePhase};
pub use recovery::{Recovery, RecoveryOutcome, resolve};
pub use snapshot::{SnapshotWriter, SnapshotWriterStats};
pub use storage::{SnapshotMeta, SnapshotRecord, SnapshotStore};
