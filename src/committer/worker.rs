//! Background task that runs epochs on a timer.

use super::root_writer::{EpochOutcome, RootWriter};
use crate::blobs::BlobStore;
use crate::error::{LedgerError, Result};
use crate::pointer::PointerStore;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

enum WorkerMessage {
    /// Run an epoch now, optionally reporting its outcome.
    Trigger {
        response_tx: Option<oneshot::Sender<Result<EpochOutcome>>>,
    },
    /// Run a final epoch and stop.
    Shutdown {
        response_tx: oneshot::Sender<Result<EpochOutcome>>,
    },
}

/// Drives [`RootWriter::run_epoch`] every `epoch_interval`.
///
/// A failed epoch is logged and retried on the next tick; the staged
/// entries stay in the writer until an epoch succeeds.
pub struct EpochWorker<B: BlobStore, P: PointerStore> {
    writer: Arc<RootWriter<B, P>>,
    rx: mpsc::UnboundedReceiver<WorkerMessage>,
}

impl<B: BlobStore, P: PointerStore> EpochWorker<B, P> {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(writer: Arc<RootWriter<B, P>>) -> EpochWorkerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = EpochWorker { writer, rx };
        let task = tokio::spawn(worker.run());
        EpochWorkerHandle { tx, task }
    }

    async fn run(self) {
        let EpochWorker { writer: shared, mut rx } = self;
        let writer: &RootWriter<B, P> = &shared;
        let period = writer.config().epoch_interval;

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        info!(root = %writer.root_address(), interval = ?period, "Epoch worker started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = scheduled_epoch(writer).await;
                }
                message = rx.recv() => match message {
                    Some(WorkerMessage::Trigger { response_tx }) => {
                        let outcome = scheduled_epoch(writer).await;
                        if let Some(tx) = response_tx {
                            let _ = tx.send(outcome);
                        }
                    }
                    Some(WorkerMessage::Shutdown { response_tx }) => {
                        let _ = response_tx.send(scheduled_epoch(writer).await);
                        break;
                    }
                    None => {
                        // Every handle is gone; drain once more before stopping
                        let _ = scheduled_epoch(writer).await;
                        break;
                    }
                },
            }
        }

        info!(
            root = %writer.root_address(),
            staged = writer.staged_len(),
            "Epoch worker stopped"
        );
    }
}

async fn scheduled_epoch<B: BlobStore, P: PointerStore>(
    writer: &RootWriter<B, P>,
) -> Result<EpochOutcome> {
    let outcome = writer.run_epoch().await;
    if let Err(ref e) = outcome {
        warn!(
            root = %writer.root_address(),
            error = %e,
            staged = writer.staged_len(),
            "Scheduled epoch failed, will retry"
        );
    }
    outcome
}

/// Control handle for a spawned [`EpochWorker`].
pub struct EpochWorkerHandle {
    tx: mpsc::UnboundedSender<WorkerMessage>,
    task: JoinHandle<()>,
}

impl EpochWorkerHandle {
    /// Ask the worker to run an epoch without waiting for the next tick.
    pub fn trigger(&self) {
        let _ = self.tx.send(WorkerMessage::Trigger { response_tx: None });
    }

    /// Run an epoch on the worker and wait for its outcome.
    pub async fn run_now(&self) -> Result<EpochOutcome> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(WorkerMessage::Trigger {
                response_tx: Some(response_tx),
            })
            .map_err(|_| worker_gone())?;
        response_rx.await.map_err(|_| worker_gone())?
    }

    /// Stop the worker after a final epoch, returning that epoch's outcome.
    pub async fn shutdown(self) -> Result<EpochOutcome> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(WorkerMessage::Shutdown { response_tx })
            .map_err(|_| worker_gone())?;
        let outcome = response_rx.await.map_err(|_| worker_gone())?;
        let _ = self.task.await;
        outcome
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

fn worker_gone() -> LedgerError {
    LedgerError::InvalidOperation("epoch worker is not running".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blobs::MemoryBlobStore;
    use crate::config::LedgerConfig;
    use crate::directory::bootstrap_root;
    use crate::pointer::MemoryPointerStore;
    use serde_json::json;
    use std::time::Duration;

    async fn writer(interval: Duration) -> Arc<RootWriter<MemoryBlobStore, MemoryPointerStore>> {
        let blobs = MemoryBlobStore::new();
        let pointer = MemoryPointerStore::new();
        let config = LedgerConfig::new("worker-root").with_epoch_interval(interval);
        bootstrap_root(&blobs, &pointer, &config.root_address)
            .await
            .unwrap();
        Arc::new(RootWriter::open(config, blobs, pointer).await.unwrap())
    }

    #[tokio::test]
    async fn test_run_now() {
        let writer = writer(Duration::from_secs(3600)).await;
        let handle = EpochWorker::spawn(Arc::clone(&writer));

        writer.append_data("a", json!(1)).unwrap();
        let outcome = handle.run_now().await.unwrap();
        assert!(matches!(outcome, EpochOutcome::Committed(ref s) if s.entries == 1));
        assert_eq!(writer.staged_len(), 0);

        assert_eq!(handle.shutdown().await.unwrap(), EpochOutcome::Empty);
    }

    #[tokio::test]
    async fn test_shutdown_drains() {
        let writer = writer(Duration::from_secs(3600)).await;
        let handle = EpochWorker::spawn(Arc::clone(&writer));

        writer.append_data("a", json!("x")).unwrap();
        writer.append_data("b", json!("y")).unwrap();

        let outcome = handle.shutdown().await.unwrap();
        assert!(matches!(outcome, EpochOutcome::Committed(ref s) if s.entries == 2));
        assert_eq!(writer.staged_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_commit() {
        let writer = writer(Duration::from_millis(100)).await;
        let handle = EpochWorker::spawn(Arc::clone(&writer));

        writer.append_data("a", json!(1)).unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(writer.staged_len(), 0);
        assert_eq!(
            writer.topic_contents("a", None).await.unwrap().data,
            vec![json!(1)]
        );
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_run_now_after_worker_stopped() {
        let writer = writer(Duration::from_secs(3600)).await;
        let handle = EpochWorker::spawn(Arc::clone(&writer));

        handle.task.abort();
        while !handle.is_finished() {
            tokio::task::yield_now().await;
        }

        writer.append_data("a", json!(1)).unwrap();
        let err = handle.run_now().await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidOperation(_)));
        assert!(!err.is_collaborator_failure());
        assert_eq!(writer.staged_len(), 1);
    }

    #[tokio::test]
    async fn test_trigger() {
        let writer = writer(Duration::from_secs(3600)).await;
        let handle = EpochWorker::spawn(Arc::clone(&writer));

        writer.append_data("a", json!(1)).unwrap();
        handle.trigger();

        // Messages are handled in order, so the trigger is done once this returns
        handle.run_now().await.unwrap();
        assert_eq!(writer.staged_len(), 0);
        assert!(writer.directory().unwrap().get("a").is_some());
        handle.shutdown().await.unwrap();
    }
}
