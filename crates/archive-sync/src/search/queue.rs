//! Background indexing.
//!
//! Writers enqueue index work and move on. A single task drains the queue
//! through the [`IndexSynchronizer`]; failures are logged and broadcast to
//! whoever subscribed, never returned to the enqueuer.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use super::sync::{IndexOutcome, IndexSynchronizer};
use crate::records::ArchiveRecord;

const FAILURE_CHANNEL_CAPACITY: usize = 256;

/// An index write that did not succeed after retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexFailure {
    pub record_id: i64,
    pub operation: &'static str,
    pub error: String,
}

enum IndexCommand {
    Upsert(Box<ArchiveRecord>),
    Flush(oneshot::Sender<()>),
}

/// Handle to the index queue. Cloning shares the same worker.
#[derive(Clone)]
pub struct IndexQueue {
    commands: mpsc::UnboundedSender<IndexCommand>,
    failures: broadcast::Sender<IndexFailure>,
}

impl IndexQueue {
    /// Starts the draining task. It stops once every handle is dropped.
    pub fn spawn(synchronizer: Arc<IndexSynchronizer>) -> (Self, JoinHandle<()>) {
        let (commands, mut rx) = mpsc::unbounded_channel();
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        let failure_tx = failures.clone();

        let handle = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    IndexCommand::Upsert(record) => {
                        if let IndexOutcome::Failed { error, .. } =
                            synchronizer.index_one(&record).await
                        {
                            publish(&failure_tx, record.id, "upsert", error);
                        }
                    }
                    IndexCommand::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            tracing::debug!("Index queue closed");
        });

        (Self { commands, failures }, handle)
    }

    fn send(&self, command: IndexCommand) {
        if self.commands.send(command).is_err() {
            tracing::warn!("Index queue worker has stopped; dropping index command");
        }
    }

    pub fn enqueue_upsert(&self, record: ArchiveRecord) {
        self.send(IndexCommand::Upsert(Box::new(record)));
    }

    /// Resolves once everything enqueued before the call has been handled.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.send(IndexCommand::Flush(tx));
        let _ = rx.await;
    }

    pub fn subscribe_failures(&self) -> broadcast::Receiver<IndexFailure> {
        self.failures.subscribe()
    }
}

fn publish(
    failures: &broadcast::Sender<IndexFailure>,
    record_id: i64,
    operation: &'static str,
    error: String,
) {
    tracing::warn!(record_id, operation, error = %error, "Background index write failed");
    // No subscribers is fine.
    let _ = failures.send(IndexFailure {
        record_id,
        operation,
        error,
    });
}
