use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

use cama_core::{OutboundQueue, StorageError};

use crate::protocol::Batch;
use crate::sink::{Sink, SinkError};

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Error type for a single flush attempt.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Sink did not acknowledge within {0:?}")]
    Timeout(Duration),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// How the engine batches and paces deliveries.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPolicy {
    pub batch_size: usize,
    pub sink_timeout: Duration,
    pub interval: Duration,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            sink_timeout: DEFAULT_SINK_TIMEOUT,
            interval: DEFAULT_SYNC_INTERVAL,
        }
    }
}

/// Outcome of a flush.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncResult {
    /// Items acknowledged by the sink and purged from the queue.
    pub sent: usize,
    /// Whether an attempt failed. Failed items stay queued for the next flush.
    pub failed: bool,
}

impl SyncResult {
    fn absorb(&mut self, other: SyncResult) {
        self.sent += other.sent;
        self.failed |= other.failed;
    }
}

/// Moves queued changes to a sink in FIFO batches.
///
/// A batch is purged only after the sink acknowledged it. Any failure,
/// including a timeout or the flush future being dropped mid-delivery,
/// leaves the queue exactly as it was, so delivery is at-least-once.
pub struct SyncEngine<Q, K>
where
    Q: OutboundQueue,
    K: Sink,
{
    queue: Arc<Q>,
    sink: Arc<K>,
    policy: SyncPolicy,
}

impl<Q, K> SyncEngine<Q, K>
where
    Q: OutboundQueue,
    K: Sink,
{
    /// A zero batch size would never move anything and is raised to 1.
    pub fn new(queue: Arc<Q>, sink: Arc<K>, mut policy: SyncPolicy) -> Self {
        if policy.batch_size == 0 {
            tracing::warn!("sync batch size of 0 raised to 1");
            policy.batch_size = 1;
        }
        Self {
            queue,
            sink,
            policy,
        }
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    /// Deliver one batch of up to `batch_size` items, returning how many were
    /// sent. An empty queue returns 0 without contacting the sink.
    pub async fn try_flush(&self, batch_size: usize) -> Result<usize, SyncError> {
        let items = self.queue.take_batch(batch_size)?;
        if items.is_empty() {
            return Ok(0);
        }

        let batch = Batch::new(items);
        let sequences = batch.sequences();

        match timeout(self.policy.sink_timeout, self.sink.deliver(&batch)).await {
            Ok(delivered) => delivered?,
            Err(_) => return Err(SyncError::Timeout(self.policy.sink_timeout)),
        }

        // Acknowledged; from here a failure only means redelivery
        let purged = self.queue.purge(&sequences)?;
        if purged != sequences.len() {
            tracing::debug!(
                sent = sequences.len(),
                purged,
                "some acknowledged items were already purged"
            );
        }

        Ok(sequences.len())
    }

    /// Deliver one batch and report the outcome. Errors are logged, not
    /// returned; the affected items remain queued.
    pub async fn flush(&self, batch_size: usize) -> SyncResult {
        match self.try_flush(batch_size).await {
            Ok(sent) => {
                if sent > 0 {
                    tracing::info!(sent, "flushed outbound batch");
                }
                SyncResult {
                    sent,
                    failed: false,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "flush failed, items stay queued");
                SyncResult {
                    sent: 0,
                    failed: true,
                }
            }
        }
    }

    /// Flush with the policy batch size until the queue is empty or a flush
    /// fails.
    pub async fn drain(&self) -> SyncResult {
        let mut total = SyncResult::default();
        loop {
            let result = self.flush(self.policy.batch_size).await;
            total.absorb(result);
            if result.failed || result.sent == 0 {
                return total;
            }
        }
    }

    /// Run the periodic sync loop until `shutdown` turns true or its sender
    /// is dropped. A shutdown during a drain abandons it; the batch in flight
    /// stays queued.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            interval_secs = self.policy.interval.as_secs(),
            batch_size = self.policy.batch_size,
            "sync loop started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                result = self.drain() => {
                    if result.failed {
                        match self.queue.len() {
                            Ok(pending) => {
                                tracing::warn!(pending, "sync deferred to next tick");
                            }
                            Err(e) => {
                                tracing::error!("Sync error: {:?}", e);
                            }
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("shutdown requested during drain");
                        break;
                    }
                    continue;
                }
            }

            tokio::select! {
                _ = sleep(self.policy.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("sync loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use cama_core::{InMemoryOutboundQueue, QueueItemKind, QueuedItem};
    use serde_json::json;

    fn queue_with(n: u64) -> Arc<InMemoryOutboundQueue> {
        let queue = Arc::new(InMemoryOutboundQueue::new());
        for i in 0..n {
            queue
                .enqueue(QueueItemKind::CheckpointCreate, json!({ "n": i }))
                .unwrap();
        }
        queue
    }

    fn fast_policy() -> SyncPolicy {
        SyncPolicy {
            batch_size: 3,
            sink_timeout: Duration::from_millis(200),
            interval: Duration::from_millis(20),
        }
    }

    fn pending(queue: &InMemoryOutboundQueue) -> Vec<u64> {
        queue
            .take_batch(usize::MAX)
            .unwrap()
            .iter()
            .map(|i| i.sequence)
            .collect()
    }

    #[tokio::test]
    async fn test_empty_queue_does_not_contact_sink() {
        let sink = Arc::new(MemorySink::new());
        let engine = SyncEngine::new(queue_with(0), sink.clone(), fast_policy());

        let result = engine.flush(50).await;

        assert_eq!(
            result,
            SyncResult {
                sent: 0,
                failed: false
            }
        );
        assert_eq!(sink.attempts(), 0);
    }

    #[tokio::test]
    async fn test_flush_respects_batch_size_and_order() {
        let queue = queue_with(5);
        let sink = Arc::new(MemorySink::new());
        let engine = SyncEngine::new(queue.clone(), sink.clone(), fast_policy());

        let result = engine.flush(2).await;

        assert_eq!(result.sent, 2);
        assert!(!result.failed);
        assert_eq!(sink.delivered_sequences(), vec![1, 2]);
        assert_eq!(pending(&queue), vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_queue_and_retries_in_order() {
        let queue = queue_with(3);
        let sink = Arc::new(MemorySink::new());
        let engine = SyncEngine::new(queue.clone(), sink.clone(), fast_policy());

        sink.set_failing(true);
        let result = engine.flush(50).await;
        assert!(result.failed);
        assert_eq!(result.sent, 0);
        assert_eq!(queue.len().unwrap(), 3);

        sink.set_failing(false);
        let result = engine.flush(50).await;
        assert_eq!(result.sent, 3);
        assert_eq!(sink.delivered_sequences(), vec![1, 2, 3]);
        assert!(queue.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_timeout_is_a_failure() {
        let queue = queue_with(2);
        let sink = Arc::new(MemorySink::with_delay(Duration::from_millis(500)));
        let policy = SyncPolicy {
            sink_timeout: Duration::from_millis(20),
            ..fast_policy()
        };
        let engine = SyncEngine::new(queue.clone(), sink.clone(), policy);

        let err = engine.try_flush(10).await.unwrap_err();

        assert!(matches!(err, SyncError::Timeout(_)));
        assert_eq!(pending(&queue), vec![1, 2]);
        assert!(sink.batches().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_flush_purges_nothing() {
        let queue = queue_with(2);
        let sink = Arc::new(MemorySink::with_delay(Duration::from_millis(500)));
        let engine = SyncEngine::new(queue.clone(), sink.clone(), SyncPolicy::default());

        // Drop the flush future while the sink is still working
        let cancelled = timeout(Duration::from_millis(20), engine.flush(10)).await;

        assert!(cancelled.is_err());
        assert_eq!(sink.attempts(), 1);
        assert_eq!(pending(&queue), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_drain_runs_until_empty() {
        let queue = queue_with(7);
        let sink = Arc::new(MemorySink::new());
        let engine = SyncEngine::new(queue.clone(), sink.clone(), fast_policy());

        let result = engine.drain().await;

        assert_eq!(
            result,
            SyncResult {
                sent: 7,
                failed: false
            }
        );
        assert_eq!(sink.batches().len(), 3);
        assert_eq!(sink.delivered_sequences(), (1..=7).collect::<Vec<u64>>());
        assert!(queue.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_drain_stops_at_first_failure() {
        let queue = queue_with(4);
        let sink = Arc::new(MemorySink::new());
        sink.set_failing(true);
        let engine = SyncEngine::new(queue.clone(), sink.clone(), fast_policy());

        let result = engine.drain().await;

        assert!(result.failed);
        assert_eq!(result.sent, 0);
        assert_eq!(sink.attempts(), 1);
        assert_eq!(queue.len().unwrap(), 4);
    }

    /// Queue whose purge always fails, as if the disk went away after the ack.
    struct PurgeFailsQueue(InMemoryOutboundQueue);

    impl OutboundQueue for PurgeFailsQueue {
        fn enqueue(
            &self,
            kind: QueueItemKind,
            payload: serde_json::Value,
        ) -> Result<QueuedItem, StorageError> {
            self.0.enqueue(kind, payload)
        }

        fn take_batch(&self, max_items: usize) -> Result<Vec<QueuedItem>, StorageError> {
            self.0.take_batch(max_items)
        }

        fn purge(&self, _sequences: &[u64]) -> Result<usize, StorageError> {
            Err(StorageError::Database("disk detached".to_string()))
        }

        fn len(&self) -> Result<usize, StorageError> {
            self.0.len()
        }
    }

    #[tokio::test]
    async fn test_purge_failure_after_ack_redelivers() {
        let queue = Arc::new(PurgeFailsQueue(InMemoryOutboundQueue::new()));
        queue
            .enqueue(QueueItemKind::SessionUpload, json!({ "id": "s" }))
            .unwrap();
        let sink = Arc::new(MemorySink::new());
        let engine = SyncEngine::new(queue.clone(), sink.clone(), fast_policy());

        assert!(engine.flush(10).await.failed);
        assert!(engine.flush(10).await.failed);

        // Delivered twice, never dropped
        assert_eq!(sink.delivered_sequences(), vec![1, 1]);
        assert_eq!(queue.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_run_drains_and_stops_on_shutdown() {
        let queue = queue_with(4);
        let sink = Arc::new(MemorySink::new());
        let engine = Arc::new(SyncEngine::new(
            queue.clone(),
            sink.clone(),
            fast_policy(),
        ));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn({
            let engine = engine.clone();
            async move { engine.run(rx).await }
        });

        sleep(Duration::from_millis(100)).await;
        queue
            .enqueue(QueueItemKind::CheckpointDelete, json!({ "id": "late" }))
            .unwrap();
        sleep(Duration::from_millis(100)).await;

        tx.send(true).unwrap();
        timeout(Duration::from_secs(2), handle)
            .await
            .expect("sync loop did not stop")
            .unwrap();

        assert_eq!(sink.delivered_sequences(), vec![1, 2, 3, 4, 5]);
        assert!(queue.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_raised_to_one() {
        let queue = queue_with(2);
        let sink = Arc::new(MemorySink::new());
        let policy = SyncPolicy {
            batch_size: 0,
            ..fast_policy()
        };
        let engine = SyncEngine::new(queue.clone(), sink.clone(), policy);

        assert_eq!(engine.policy().batch_size, 1);

        let result = engine.drain().await;
        assert_eq!(result.sent, 2);
        assert_eq!(sink.batches().len(), 2);
        assert!(queue.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_slow_drain() {
        let queue = queue_with(2);
        let sink = Arc::new(MemorySink::with_delay(Duration::from_secs(5)));
        let policy = SyncPolicy {
            sink_timeout: Duration::from_secs(10),
            ..fast_policy()
        };
        let engine = Arc::new(SyncEngine::new(queue.clone(), sink.clone(), policy));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn({
            let engine = engine.clone();
            async move { engine.run(rx).await }
        });

        sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        timeout(Duration::from_secs(1), handle)
            .await
            .expect("sync loop ignored shutdown")
            .unwrap();

        assert_eq!(sink.attempts(), 1);
        assert!(sink.batches().is_empty());
        assert_eq!(pending(&queue), vec![1, 2]);
    }
}
