use super::notification::{BatchNotifier, BatchSummary, NotificationPolicy};
use crate::models::{
    CancelOutcome, FileStatus, RunGuard, TransferBatch, TransferDirection, TransferEntry,
    TransferResult,
};
use crate::state::StateManager;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::timeout;

/// Moves the bytes of one entry to or from the paired device
///
/// Implementations may take as long as they need, but should check
/// [`TransferEntry::is_cancel_requested`] between chunks and return early
/// once it is set. Failures are reported through [`TransferResult`], never
/// by panicking.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransferChannel: Send + Sync {
    async fn send(&self, entry: &TransferEntry) -> TransferResult;
    async fn receive(&self, entry: &TransferEntry) -> TransferResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Transfers allowed in flight at once; 1 runs the batch sequentially
    pub max_concurrent: usize,
    /// Abandon a channel call after this long. `None` waits forever, so an
    /// unresponsive channel keeps its entry in `RUN` and the batch busy.
    pub transfer_timeout: Option<Duration>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            transfer_timeout: None,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EngineError {
    #[error("Batch already has a transfer pass running")]
    BatchBusy,
}

/// Final state of one entry after a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryOutcome {
    pub id: String,
    pub name: String,
    pub status: FileStatus,
    pub message: Option<String>,
}

impl EntryOutcome {
    fn from_entry(entry: &TransferEntry, status: FileStatus) -> Self {
        Self {
            id: entry.id().to_string(),
            name: entry.name().to_string(),
            status,
            message: entry.message(),
        }
    }
}

/// Outcomes of one pass, in batch order
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub direction: TransferDirection,
    pub entries: Vec<EntryOutcome>,
}

impl BatchOutcome {
    pub fn summary(&self) -> BatchSummary {
        let count = |status: FileStatus| self.entries.iter().filter(|e| e.status == status).count();
        BatchSummary {
            succeeded: count(FileStatus::Done),
            failed: count(FileStatus::Failed),
            cancelled: count(FileStatus::Cancel),
            total: self.entries.len(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&EntryOutcome> {
        self.entries.iter().find(|e| e.id == id)
    }
}

/// Runs batches of transfers against a [`TransferChannel`]
///
/// Entries start in batch order; at most `max_concurrent` transfers are in
/// flight. Each entry's status is changed only under that entry's own lock,
/// and never while its transfer is running, so [`cancel`](Self::cancel) and
/// status queries stay responsive from any thread.
pub struct TransferJobEngine {
    channel: Arc<dyn TransferChannel>,
    notifications: NotificationPolicy,
    state: StateManager,
    options: EngineOptions,
}

impl TransferJobEngine {
    pub fn new(
        channel: Arc<dyn TransferChannel>,
        notifications: NotificationPolicy,
        options: EngineOptions,
    ) -> Self {
        Self {
            channel,
            notifications,
            state: StateManager::new(),
            options,
        }
    }

    /// Publish progress through an existing manager instead of a private one
    pub fn with_state_manager(mut self, state: StateManager) -> Self {
        self.state = state;
        self
    }

    pub fn state_manager(&self) -> &StateManager {
        &self.state
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    /// Run every `WAIT` entry of `batch` through the channel.
    ///
    /// Returns [`EngineError::BatchBusy`] without touching any entry if a pass
    /// over this batch (or a batch sharing its running flag) is in progress.
    /// A failing entry never stops the others.
    ///
    /// Dropping the returned future stops scheduling new entries. Transfers
    /// already spawned run to completion, and the batch stays claimed until
    /// the last of them has finished.
    pub async fn run(
        &self,
        batch: &TransferBatch,
        direction: TransferDirection,
    ) -> Result<BatchOutcome, EngineError> {
        let Some(claim) = batch.try_claim() else {
            tracing::warn!("Rejected {} pass: batch is already running", direction);
            return Err(EngineError::BatchBusy);
        };

        let pending: Vec<Arc<TransferEntry>> = batch
            .entries()
            .into_iter()
            .filter(|e| e.status() == FileStatus::Wait)
            .collect();
        let total = pending.len();

        tracing::info!(
            "Starting {} of {} entries (max concurrent: {})",
            direction,
            total,
            self.options.max_concurrent
        );

        self.state.begin_batch(direction, total);
        let worker = Arc::new(Worker {
            channel: Arc::clone(&self.channel),
            notifier: self.notifications.begin_batch(direction, total),
            state: self.state.clone(),
            direction,
            transfer_timeout: self.options.transfer_timeout,
            _claim: claim,
        });
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent.max(1)));

        let mut tasks = Vec::with_capacity(total);
        for entry in pending {
            // Acquired here rather than in the task so entries start in order
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                tracing::error!("Transfer semaphore closed; stopping {} pass", direction);
                break;
            };
            let worker = Arc::clone(&worker);
            let task_entry = Arc::clone(&entry);
            let task = tokio::spawn(async move {
                let _permit = permit;
                worker.execute(&task_entry).await
            });
            tasks.push((entry, task));
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (entry, task) in tasks {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("Transfer task for {} failed: {}", entry.name(), e);
                    worker.abandon(&entry, &format!("Transfer task failed: {}", e))
                }
            };
            outcomes.push(outcome);
        }

        // Every task has dropped its handle by now; this one ends the pass
        drop(worker);

        Ok(BatchOutcome {
            direction,
            entries: outcomes,
        })
    }

    /// Cancel one entry without waiting for its transfer to stop
    pub fn cancel(&self, entry: &TransferEntry) -> CancelOutcome {
        let outcome = entry.cancel();
        match outcome {
            CancelOutcome::Cancelled => tracing::info!("Cancelled {} before start", entry.name()),
            CancelOutcome::Requested => {
                tracing::info!("Cancellation requested for {}", entry.name());
                self.state.cancel_requested(entry.id());
            }
            CancelOutcome::Ignored => {
                tracing::debug!("Ignoring cancel for {}: already {}", entry.name(), entry.status())
            }
        }
        outcome
    }

    /// Cancel every non-terminal entry; returns how many were affected
    pub fn cancel_all(&self, batch: &TransferBatch) -> usize {
        batch
            .entries()
            .iter()
            .filter(|e| self.cancel(e) != CancelOutcome::Ignored)
            .count()
    }

    /// Reset every `FAILED` entry to `WAIT` and return them as a batch.
    ///
    /// The returned batch shares `batch`'s running flag.
    pub fn retry_failed(&self, batch: &TransferBatch) -> TransferBatch {
        let retried: Vec<_> = batch
            .entries()
            .into_iter()
            .filter(|e| e.reset_for_retry())
            .collect();
        tracing::info!("Retrying {} failed entries", retried.len());
        batch.sub_batch(retried)
    }
}

/// Shared by the tasks of one pass
///
/// Owns the batch claim. The pass ends when the last handle is dropped, which
/// is after every spawned transfer has finished even if `run` was abandoned.
struct Worker {
    channel: Arc<dyn TransferChannel>,
    notifier: BatchNotifier,
    state: StateManager,
    direction: TransferDirection,
    transfer_timeout: Option<Duration>,
    _claim: RunGuard,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let summary = self.notifier.summary();
        tracing::info!(
            "Finished {} pass: {} succeeded, {} failed, {} cancelled",
            self.direction,
            summary.succeeded,
            summary.failed,
            summary.cancelled
        );
        self.state.finish_batch(&summary);
    }
}

impl Worker {
    async fn execute(&self, entry: &TransferEntry) -> EntryOutcome {
        if let Err(status) = entry.begin() {
            tracing::debug!("Skipping {}: already {}", entry.name(), status);
            self.complete(entry, status);
            return EntryOutcome::from_entry(entry, status);
        }

        tracing::info!("Transferring {} ({} bytes)", entry.name(), entry.size());
        self.state.entry_started(entry.id(), entry.name());

        let transfer = async {
            match self.direction {
                TransferDirection::Upload => self.channel.send(entry).await,
                TransferDirection::Download => self.channel.receive(entry).await,
            }
        };
        let result = match self.transfer_timeout {
            Some(limit) => match timeout(limit, transfer).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!("Abandoning {} after {:?}", entry.name(), limit);
                    TransferResult::failure("Timed out")
                }
            },
            None => transfer.await,
        };

        let status = entry.finish(&result);
        match status {
            FileStatus::Done => tracing::info!("{} completed: {}", entry.name(), result.message),
            FileStatus::Failed => tracing::warn!("{} failed: {}", entry.name(), result.message),
            _ => tracing::info!("{} ended {}", entry.name(), status),
        }

        self.complete(entry, status);
        EntryOutcome::from_entry(entry, status)
    }

    /// Settle an entry whose task died before reaching a terminal state
    fn abandon(&self, entry: &TransferEntry, message: &str) -> EntryOutcome {
        let status = match entry.status() {
            FileStatus::Run => {
                let status = entry.finish(&TransferResult::failure(message));
                self.complete(entry, status);
                status
            }
            status => status,
        };
        EntryOutcome::from_entry(entry, status)
    }

    fn complete(&self, entry: &TransferEntry, status: FileStatus) {
        self.notifier.record(entry, status);
        let message = entry.message().unwrap_or_default();
        self.state
            .entry_finished(entry.id(), entry.name(), status, &message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransferEntry;
    use crate::services::notification::{MockNotificationSink, NotifyMode};

    fn create_test_batch(count: usize) -> TransferBatch {
        TransferBatch::new(
            (0..count).map(|i| TransferEntry::new(i.to_string(), format!("file{}.bin", i), 100)),
        )
    }

    fn engine(channel: MockTransferChannel) -> TransferJobEngine {
        TransferJobEngine::new(
            Arc::new(channel),
            NotificationPolicy::silent(),
            EngineOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_upload_uses_send() {
        let mut channel = MockTransferChannel::new();
        channel
            .expect_send()
            .times(2)
            .returning(|_| TransferResult::success("OK"));
        channel.expect_receive().never();

        let batch = create_test_batch(2);
        let outcome = engine(channel)
            .run(&batch, TransferDirection::Upload)
            .await
            .unwrap();

        assert_eq!(outcome.summary().succeeded, 2);
        assert_eq!(batch.count(FileStatus::Done), 2);
    }

    #[tokio::test]
    async fn test_download_uses_receive() {
        let mut channel = MockTransferChannel::new();
        channel.expect_send().never();
        channel
            .expect_receive()
            .times(1)
            .returning(|_| TransferResult::failure("disk full"));

        let batch = create_test_batch(1);
        let outcome = engine(channel)
            .run(&batch, TransferDirection::Download)
            .await
            .unwrap();

        assert_eq!(outcome.entries[0].status, FileStatus::Failed);
        assert_eq!(outcome.entries[0].message.as_deref(), Some("disk full"));
    }

    #[tokio::test]
    async fn test_only_waiting_entries_run() {
        let mut channel = MockTransferChannel::new();
        channel
            .expect_send()
            .withf(|entry| entry.id() == "1")
            .times(1)
            .returning(|_| TransferResult::success("OK"));

        let batch = create_test_batch(2);
        batch.get("0").unwrap().cancel();

        let outcome = engine(channel)
            .run(&batch, TransferDirection::Upload)
            .await
            .unwrap();

        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(batch.get("0").unwrap().status(), FileStatus::Cancel);
    }

    #[tokio::test]
    async fn test_busy_batch_rejected() {
        let channel = MockTransferChannel::new();
        let batch = create_test_batch(1);
        let _guard = batch.try_claim().unwrap();

        let result = engine(channel).run(&batch, TransferDirection::Upload).await;

        assert_eq!(result.unwrap_err(), EngineError::BatchBusy);
        assert_eq!(batch.get("0").unwrap().status(), FileStatus::Wait);
    }

    #[tokio::test]
    async fn test_retry_failed_reruns_only_failures() {
        let mut channel = MockTransferChannel::new();
        let mut seq = mockall::Sequence::new();
        channel
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| TransferResult::failure("refused"));
        channel
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| TransferResult::success("OK"));
        channel
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| TransferResult::success("OK"));

        let engine = engine(channel);
        let batch = create_test_batch(2);
        engine.run(&batch, TransferDirection::Upload).await.unwrap();
        assert_eq!(batch.count(FileStatus::Failed), 1);

        let retry = engine.retry_failed(&batch);
        assert_eq!(retry.len(), 1);
        assert_eq!(retry.get("0").unwrap().attempt(), 2);

        engine.run(&retry, TransferDirection::Upload).await.unwrap();
        assert_eq!(batch.count(FileStatus::Done), 2);
    }

    #[tokio::test]
    async fn test_batched_notification_after_pass() {
        let mut sink = MockNotificationSink::new();
        sink.expect_notify()
            .withf(|n| n.summary.map(|s| (s.succeeded, s.total)) == Some((2, 2)))
            .times(1)
            .return_const(());
        let mut channel = MockTransferChannel::new();
        channel
            .expect_receive()
            .returning(|_| TransferResult::success("OK"));

        let engine = TransferJobEngine::new(
            Arc::new(channel),
            NotificationPolicy::new(Arc::new(sink))
                .with_modes(NotifyMode::None, NotifyMode::Batched),
            EngineOptions::default(),
        );
        let batch = create_test_batch(2);
        engine.run(&batch, TransferDirection::Download).await.unwrap();
    }
}
