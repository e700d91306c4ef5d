//! Server lifecycle and ownership of the live [`ServerState`].

use crate::config::ServerConfig;
use crate::core::{
    DEFAULT_MODEL_VERSION, ModelDeployment, Result, ServerError, ServerState,
};
use crate::recovery::{self, Recovery, RecoveryOutcome};
use crate::sinks;
use crate::snapshot::{SnapshotWriter, SnapshotWriterStats};
use crate::storage::SnapshotStore;
use std::fmt;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

struct Runtime {
    phase: LifecyclePhase,
    state: ServerState,
    writer: Option<SnapshotWriter>,
}

/// Drives `Stopped -> Starting -> Running -> Stopping -> Stopped` and applies
/// management mutations.
///
/// Every successful mutation enqueues one Change snapshot while the state lock
/// is still held, so snapshot sequence order always matches mutation order.
/// `start` and `stop` are serialized by a separate lifecycle lock; a `stop`
/// issued during `start` waits for it.
pub struct LifecycleController {
    config: ServerConfig,
    store: SnapshotStore,
    lifecycle: Mutex<()>,
    runtime: Mutex<Runtime>,
}

impl LifecycleController {
    pub fn new(config: ServerConfig) -> Self {
        let store = SnapshotStore::open(&config.snapshot_dir, !config.disable_snapshots);
        Self {
            config,
            store,
            lifecycle: Mutex::new(()),
            runtime: Mutex::new(Runtime {
                phase: LifecyclePhase::Stopped,
                state: ServerState::new(),
                writer: None,
            }),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub async fn phase(&self) -> LifecyclePhase {
        self.runtime.lock().await.phase
    }

    /// Restores state, prepares the sink files, starts the snapshot writer and
    /// records a Startup snapshot. Snapshot problems never fail startup; they
    /// are reported through the returned outcome.
    pub async fn start(&self) -> Result<RecoveryOutcome> {
        let _lifecycle = self.lifecycle.lock().await;

        {
            let mut runtime = self.runtime.lock().await;
            if runtime.phase != LifecyclePhase::Stopped {
                return Err(ServerError::InvalidLifecycle(format!(
                    "cannot start while {}",
                    runtime.phase
                )));
            }
            runtime.phase = LifecyclePhase::Starting;
        }

        let (recovery, first_sequence) = self.recover().await;
        let mut state = recovery.state;
        state.set_model_store(Some(self.config.model_store.clone()));

        if let Err(err) = sinks::ensure_sinks(&self.config.log_dir) {
            tracing::warn!(error = %err, log_dir = %self.config.log_dir.display(), "log sinks unavailable");
        }

        let writer = SnapshotWriter::spawn(
            self.store.clone(),
            first_sequence,
            self.config.queue_capacity,
        );

        let mut runtime = self.runtime.lock().await;
        runtime.state = state;
        if let Err(err) = writer.on_startup(runtime.state.clone()).await {
            tracing::warn!(error = %err, "startup snapshot not recorded");
        }
        runtime.writer = Some(writer);
        runtime.phase = LifecyclePhase::Running;

        tracing::info!(
            models = runtime.state.model_count(),
            snapshots_enabled = self.store.is_enabled(),
            "model server running"
        );
        Ok(recovery.outcome)
    }

    /// Records a Shutdown snapshot and waits, up to the configured grace
    /// period, for pending snapshot writes. Stopping a stopped server is a
    /// no-op.
    pub async fn stop(&self) -> Result<SnapshotWriterStats> {
        let _lifecycle = self.lifecycle.lock().await;

        let writer = {
            let mut runtime = self.runtime.lock().await;
            match runtime.phase {
                LifecyclePhase::Stopped => return Ok(SnapshotWriterStats::default()),
                LifecyclePhase::Running => {}
                other => {
                    return Err(ServerError::InvalidLifecycle(format!(
                        "cannot stop while {}",
                        other
                    )));
                }
            }
            runtime.phase = LifecyclePhase::Stopping;
            if let Some(writer) = runtime.writer.as_ref() {
                if let Err(err) = writer.on_shutdown(runtime.state.clone()).await {
                    tracing::warn!(error = %err, "shutdown snapshot not recorded");
                }
            }
            runtime.writer.take()
        };

        let stats = match writer {
            Some(writer) => writer.close(self.config.shutdown_grace).await,
            None => SnapshotWriterStats::default(),
        };

        self.runtime.lock().await.phase = LifecyclePhase::Stopped;
        tracing::info!(
            written = stats.written,
            failed = stats.failed,
            "model server stopped"
        );
        Ok(stats)
    }

    /// Registers a new model with a single default version.
    pub async fn register(
        &self,
        model_name: &str,
        artifact_location: &str,
        workers: u32,
    ) -> Result<ModelDeployment> {
        let deployment =
            ModelDeployment::new(model_name, DEFAULT_MODEL_VERSION, artifact_location, workers)
                .as_default();
        self.mutate(move |state| {
            state.insert_model(deployment.model_name.clone(), vec![deployment.clone()])?;
            Ok(deployment)
        })
        .await
    }

    /// Adds a version to a model, registering the model if it is new.
    pub async fn register_version(&self, deployment: ModelDeployment) -> Result<()> {
        self.mutate(move |state| state.add_deployment(deployment))
            .await
    }

    /// Sets the worker count of the model's default version.
    pub async fn scale(&self, model_name: &str, workers: u32) -> Result<ModelDeployment> {
        self.mutate(|state| {
            let deployment = state.default_deployment_mut(model_name)?;
            deployment.scale_to(workers);
            Ok(deployment.clone())
        })
        .await
    }

    pub async fn set_default_version(&self, model_name: &str, version: &str) -> Result<()> {
        self.mutate(|state| state.set_default_version(model_name, version))
            .await
    }

    pub async fn unregister(&self, model_name: &str) -> Result<Vec<ModelDeployment>> {
        self.mutate(|state| state.remove_model(model_name)).await
    }

    /// Copy of the current state.
    pub async fn list_models(&self) -> ServerState {
        self.runtime.lock().await.state.clone()
    }

    pub async fn describe_model(&self, model_name: &str) -> Result<Vec<ModelDeployment>> {
        self.runtime
            .lock()
            .await
            .state
            .get(model_name)
            .map(|versions| versions.to_vec())
            .ok_or_else(|| ServerError::ModelNotFound(model_name.to_string()))
    }

    pub async fn writer_stats(&self) -> Option<SnapshotWriterStats> {
        self.runtime
            .lock()
            .await
            .writer
            .as_ref()
            .map(SnapshotWriter::stats)
    }

    /// Waits until every snapshot enqueued so far has been handled. The state
    /// lock is released before waiting on the writer.
    pub async fn flush_snapshots(&self) -> Result<()> {
        let ack = {
            let runtime = self.runtime.lock().await;
            match runtime.writer.as_ref() {
                Some(writer) => writer.request_flush().await?,
                None => return Ok(()),
            }
        };
        ack.await.map_err(|_| ServerError::WriterClosed)
    }

    async fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut ServerState) -> Result<T>,
    {
        let mut runtime = self.runtime.lock().await;
        if runtime.phase != LifecyclePhase::Running {
            return Err(ServerError::InvalidLifecycle(format!(
                "management calls need a running server, server is {}",
                runtime.phase
            )));
        }

        let output = f(&mut runtime.state)?;

        // Enqueued under the lock to keep sequence order equal to mutation
        // order. A full queue therefore stalls other callers until the writer
        // catches up; see `ServerConfig::queue_capacity`.
        let snapshot = runtime.state.clone();
        if let Some(writer) = runtime.writer.as_ref() {
            if let Err(err) = writer.on_state_change(snapshot).await {
                tracing::warn!(error = %err, "change snapshot not recorded");
            }
        }
        Ok(output)
    }

    async fn recover(&self) -> (Recovery, u64) {
        let store = self.store.clone();
        let explicit = self.config.snapshot_file.clone();

        let resolved = tokio::task::spawn_blocking(move || {
            let recovery = recovery::resolve(explicit.as_deref(), &store);
            (recovery, store.next_sequence())
        })
        .await;

        match resolved {
            Ok(resolved) => resolved,
            Err(err) => {
                tracing::warn!(error = %err, "snapshot recovery task failed, starting with empty state");
                let recovery = Recovery {
                    state: ServerState::new(),
                    outcome: RecoveryOutcome::FellBackEmpty(ServerError::Io(err.to_string())),
                };
                (recovery, 1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SnapshotKind;
    use tempfile::TempDir;

    fn controller(temp_dir: &TempDir) -> LifecycleController {
        LifecycleController::new(
            ServerConfig::new(temp_dir.path().join("model_store")).log_dir(temp_dir.path().join("logs")),
        )
    }

    #[tokio::test]
    async fn test_phases() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(&temp_dir);
        assert_eq!(controller.phase().await, LifecyclePhase::Stopped);

        controller.start().await.unwrap();
        assert_eq!(controller.phase().await, LifecyclePhase::Running);

        controller.stop().await.unwrap();
        assert_eq!(controller.phase().await, LifecyclePhase::Stopped);
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(&temp_dir);
        controller.start().await.unwrap();

        let err = controller.start().await.unwrap_err();
        assert!(matches!(err, ServerError::InvalidLifecycle(_)));
        controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(&temp_dir);

        let stats = controller.stop().await.unwrap();
        assert_eq!(stats, SnapshotWriterStats::default());
        assert!(controller.store().list_snapshots().is_empty());
    }

    #[tokio::test]
    async fn test_mutations_need_running_server() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(&temp_dir);

        let err = controller.register("densenet161", "densenet161.mar", 1).await.unwrap_err();
        assert!(matches!(err, ServerError::InvalidLifecycle(_)));
    }

    #[tokio::test]
    async fn test_management_operations() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(&temp_dir);
        controller.start().await.unwrap();

        controller.register("densenet161", "densenet161.mar", 1).await.unwrap();
        controller
            .register_version(ModelDeployment::new("densenet161", "2.0", "densenet161-v2.mar", 1))
            .await
            .unwrap();
        let scaled = controller.scale("densenet161", 4).await.unwrap();
        assert_eq!((scaled.version.as_str(), scaled.worker_count), ("1.0", 4));

        controller.set_default_version("densenet161", "2.0").await.unwrap();
        assert_eq!(controller.scale("densenet161", 2).await.unwrap().version, "2.0");

        assert_eq!(controller.describe_model("densenet161").await.unwrap().len(), 2);
        assert!(matches!(
            controller.scale("resnet-18", 1).await.unwrap_err(),
            ServerError::ModelNotFound(_)
        ));

        controller.unregister("densenet161").await.unwrap();
        assert!(controller.list_models().await.is_empty());

        controller.flush_snapshots().await.unwrap();
        let changes = controller
            .store()
            .list_snapshots()
            .iter()
            .filter(|m| m.kind == SnapshotKind::Change)
            .count();
        assert_eq!(changes, 6);
        controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_pending_flush_does_not_hold_state_lock() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(&temp_dir);
        controller.start().await.unwrap();

        let mut flush = Box::pin(controller.flush_snapshots());
        let _ = futures::poll!(&mut flush);

        let models = tokio::time::timeout(std::time::Duration::from_secs(1), controller.list_models())
            .await
            .unwrap();
        assert!(models.is_empty());

        flush.await.unwrap();
        controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_single_slot_queue_keeps_every_change() {
        let temp_dir = TempDir::new().unwrap();
        let controller = LifecycleController::new(
            ServerConfig::new(temp_dir.path().join("model_store"))
                .log_dir(temp_dir.path().join("logs"))
                .queue_capacity(1),
        );
        controller.start().await.unwrap();

        for i in 0..10 {
            controller
                .register(&format!("model-{}", i), &format!("model-{}.mar", i), 1)
                .await
                .unwrap();
        }
        let stats = controller.stop().await.unwrap();
        assert_eq!(stats.written, 12);

        let store = controller.store();
        let changes = store
            .list_snapshots()
            .into_iter()
            .filter(|m| m.kind == SnapshotKind::Change)
            .collect::<Vec<_>>();
        assert_eq!(changes.len(), 10);
        for (idx, meta) in changes.iter().enumerate() {
            assert_eq!(store.read(&meta.path).unwrap().state.model_count(), idx + 1);
        }
    }

    #[tokio::test]
    async fn test_failed_mutation_records_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(&temp_dir);
        controller.start().await.unwrap();

        assert!(controller.unregister("missing").await.is_err());
        controller.flush_snapshots().await.unwrap();
        assert_eq!(controller.writer_stats().await.unwrap().written, 1);
        controller.stop().await.unwrap();
    }
}
