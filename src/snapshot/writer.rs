use crate::core::{Result, ServerError, ServerState, SnapshotKind};
use crate::storage::{SnapshotRecord, SnapshotStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

enum WriterCommand {
    Capture { kind: SnapshotKind, state: ServerState },
    Flush(oneshot::Sender<()>),
}

/// Counters kept by the writer task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotWriterStats {
    /// Snapshots committed to disk.
    pub written: u64,
    /// Captures dropped because persistence is disabled.
    pub skipped: u64,
    /// Captures whose write failed.
    pub failed: u64,
    /// Sequence of the last committed snapshot.
    pub last_sequence: Option<u64>,
}

#[derive(Debug, Default)]
struct WriterCounters {
    written: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    last_sequence: AtomicU64,
}

impl WriterCounters {
    fn snapshot(&self) -> SnapshotWriterStats {
        let last = self.last_sequence.load(Ordering::Acquire);
        SnapshotWriterStats {
            written: self.written.load(Ordering::Acquire),
            skipped: self.skipped.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
            last_sequence: (last > 0).then_some(last),
        }
    }
}

/// Single consumer of snapshot captures.
///
/// Callers enqueue on a bounded channel; one background task assigns sequence
/// numbers in receive order and writes each record through the store, one at a
/// time. Enqueueing never waits on disk I/O, only on queue capacity. Write
/// failures are logged and counted, never returned to the caller.
pub struct SnapshotWriter {
    tx: Option<mpsc::Sender<WriterCommand>>,
    counters: Arc<WriterCounters>,
    join_handle: Option<JoinHandle<()>>,
}

impl SnapshotWriter {
    /// Spawns the writer task on the current tokio runtime. `first_sequence`
    /// is the number given to the first capture.
    pub fn spawn(store: SnapshotStore, first_sequence: u64, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(WriterCounters::default());
        let join_handle = tokio::spawn(run_writer(store, first_sequence.max(1), rx, counters.clone()));

        Self {
            tx: Some(tx),
            counters,
            join_handle: Some(join_handle),
        }
    }

    pub async fn on_startup(&self, state: ServerState) -> Result<()> {
        self.capture(SnapshotKind::Startup, state).await
    }

    pub async fn on_shutdown(&self, state: ServerState) -> Result<()> {
        self.capture(SnapshotKind::Shutdown, state).await
    }

    pub async fn on_state_change(&self, state: ServerState) -> Result<()> {
        self.capture(SnapshotKind::Change, state).await
    }

    pub async fn capture(&self, kind: SnapshotKind, state: ServerState) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(ServerError::WriterClosed)?;
        tx.send(WriterCommand::Capture { kind, state })
            .await
            .map_err(|_| ServerError::WriterClosed)
    }

    /// Waits until every capture enqueued before this call has been handled.
    pub async fn flush(&self) -> Result<()> {
        let ack = self.request_flush().await?;
        ack.await.map_err(|_| ServerError::WriterClosed)
    }

    /// Enqueues a flush barrier and returns the acknowledgement without
    /// waiting for it, so the caller can release its locks first.
    pub async fn request_flush(&self) -> Result<oneshot::Receiver<()>> {
        let tx = self.tx.as_ref().ok_or(ServerError::WriterClosed)?;
        let (ack_tx, ack_rx) = oneshot::channel();
        tx.send(WriterCommand::Flush(ack_tx))
            .await
            .map_err(|_| ServerError::WriterClosed)?;
        Ok(ack_rx)
    }

    pub fn stats(&self) -> SnapshotWriterStats {
        self.counters.snapshot()
    }

    /// Closes the queue and waits for pending captures to drain, giving up
    /// after `grace`. A task still running after the grace period is aborted
    /// and its remaining captures are dropped; a write already handed to the
    /// blocking pool may still land.
    pub async fn close(mut self, grace: Duration) -> SnapshotWriterStats {
        drop(self.tx.take());

        if let Some(mut join_handle) = self.join_handle.take() {
            match timeout(grace, &mut join_handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::warn!(error = %err, "snapshot writer task failed");
                }
                Err(_) => {
                    join_handle.abort();
                    tracing::warn!(
                        grace_ms = grace.as_millis() as u64,
                        "snapshot writer did not drain within the grace period, pending snapshots dropped"
                    );
                }
            }
        }

        self.counters.snapshot()
    }
}

async fn run_writer(
    store: SnapshotStore,
    mut next_sequence: u64,
    mut rx: mpsc::Receiver<WriterCommand>,
    counters: Arc<WriterCounters>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            WriterCommand::Capture { kind, state } => {
                let sequence = next_sequence;
                next_sequence = next_sequence.saturating_add(1);
                let record = SnapshotRecord::new(kind, sequence, state);
                let store = store.clone();

                match tokio::task::spawn_blocking(move || store.write(&record)).await {
                    Ok(Ok(Some(path))) => {
                        counters.written.fetch_add(1, Ordering::AcqRel);
                        counters.last_sequence.store(sequence, Ordering::Release);
                        tracing::debug!(%kind, sequence, path = %path.display(), "snapshot written");
                    }
                    Ok(Ok(None)) => {
                        counters.skipped.fetch_add(1, Ordering::AcqRel);
                    }
                    Ok(Err(err)) => {
                        counters.failed.fetch_add(1, Ordering::AcqRel);
                        tracing::warn!(%kind, sequence, error = %err, "failed to write snapshot");
                    }
                    Err(err) => {
                        counters.failed.fetch_add(1, Ordering::AcqRel);
                        tracing::warn!(%kind, sequence, error = %err, "snapshot write task panicked");
                    }
                }
            }
            WriterCommand::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}
