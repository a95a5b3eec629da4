use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use cama_core::{EntityStore, OutboundQueue, QueueItemKind, StorageError};

/// Snapshot of what survived a restart.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecoveryReport {
    pub pending_total: usize,
    pub pending_by_kind: BTreeMap<QueueItemKind, usize>,
    pub oldest_sequence: Option<u64>,
    pub oldest_enqueued_at: Option<DateTime<Utc>>,
    /// Stored checkpoints with a pending create or update.
    pub unsynced_checkpoints: Vec<Uuid>,
    /// Sequences of pending creates/updates whose checkpoint row is gone
    /// and no later delete explains it.
    pub orphaned_events: Vec<u64>,
    /// Checkpoints still stored although their latest pending event is a delete.
    pub resurrected_checkpoints: Vec<Uuid>,
}

impl RecoveryReport {
    /// True when every pending event agrees with the stored rows.
    pub fn is_consistent(&self) -> bool {
        self.orphaned_events.is_empty() && self.resurrected_checkpoints.is_empty()
    }
}

/// Read-only inspection of the queue against the entity store after restart.
pub struct RecoveryHelper<S, Q>
where
    S: EntityStore,
    Q: OutboundQueue,
{
    store: Arc<S>,
    queue: Arc<Q>,
}

impl<S, Q> RecoveryHelper<S, Q>
where
    S: EntityStore,
    Q: OutboundQueue,
{
    pub fn new(store: Arc<S>, queue: Arc<Q>) -> Self {
        Self { store, queue }
    }

    pub fn pending_count(&self) -> Result<usize, StorageError> {
        self.queue.len()
    }

    pub fn inspect(&self) -> Result<RecoveryReport, StorageError> {
        let items = self.queue.take_batch(usize::MAX)?;

        let mut report = RecoveryReport {
            pending_total: items.len(),
            oldest_sequence: items.first().map(|i| i.sequence),
            oldest_enqueued_at: items.first().map(|i| i.enqueued_at),
            ..RecoveryReport::default()
        };

        // Latest pending kind per checkpoint, in order of first appearance
        let mut latest: HashMap<Uuid, QueueItemKind> = HashMap::new();
        let mut order = Vec::new();

        for item in &items {
            *report.pending_by_kind.entry(item.kind).or_default() += 1;

            if !item.kind.is_checkpoint() {
                continue;
            }
            let Some(id) = item.entity_id() else {
                tracing::warn!(sequence = item.sequence, "queued item has no entity id");
                continue;
            };
            if latest.insert(id, item.kind).is_none() {
                order.push(id);
            }
        }

        let mut exists = HashMap::with_capacity(order.len());
        for &id in &order {
            let present = match self.store.get_checkpoint(id) {
                Ok(_) => true,
                Err(e) if e.is_not_found() => false,
                Err(e) => return Err(e),
            };
            exists.insert(id, present);

            match (latest[&id], present) {
                (QueueItemKind::CheckpointDelete, true) => {
                    report.resurrected_checkpoints.push(id)
                }
                (QueueItemKind::CheckpointDelete, false) => {}
                (_, true) => report.unsynced_checkpoints.push(id),
                (_, false) => {}
            }
        }

        for item in &items {
            if !matches!(
                item.kind,
                QueueItemKind::CheckpointCreate | QueueItemKind::CheckpointUpdate
            ) {
                continue;
            }
            let Some(id) = item.entity_id() else {
                continue;
            };
            let deleted_later = latest.get(&id) == Some(&QueueItemKind::CheckpointDelete);
            if !exists.get(&id).copied().unwrap_or(false) && !deleted_later {
                report.orphaned_events.push(item.sequence);
            }
        }

        Ok(report)
    }

    /// Inspect and log the outcome. Intended for startup.
    pub fn log_summary(&self) -> Result<RecoveryReport, StorageError> {
        let report = self.inspect()?;

        if report.pending_total == 0 {
            tracing::info!("recovery: outbound queue is empty");
        } else {
            tracing::info!(
                pending = report.pending_total,
                oldest_sequence = ?report.oldest_sequence,
                oldest_enqueued_at = ?report.oldest_enqueued_at,
                unsynced = report.unsynced_checkpoints.len(),
                "recovery: pending changes survived restart"
            );
            for (kind, count) in &report.pending_by_kind {
                tracing::debug!(%kind, count, "recovery: pending by kind");
            }
        }

        if !report.is_consistent() {
            tracing::warn!(
                orphaned = ?report.orphaned_events,
                resurrected = ?report.resurrected_checkpoints,
                "recovery: queue disagrees with stored checkpoints"
            );
        }

        Ok(report)
    }
}
