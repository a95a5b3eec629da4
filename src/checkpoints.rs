use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use cama_core::{
    Change, Checkpoint, CheckpointFilter, CheckpointPatch, CoreError, DeletedRef, EntityStore,
    MonotonicClock, NewCheckpoint, OutboundQueue, Recorded, StorageError,
    ValidationError, Validator,
};

/// Checkpoint use cases: validate, persist, then queue the change.
///
/// The queue is only written after the store write succeeded. If enqueueing
/// fails the store write is undone and the enqueue error returned, so a
/// caller never observes a mutation without its event.
pub struct CheckpointService<S, Q>
where
    S: EntityStore,
    Q: OutboundQueue,
{
    store: Arc<S>,
    queue: Arc<Q>,
    clock: Arc<MonotonicClock>,
    writer: Mutex<()>,
}

impl<S, Q> CheckpointService<S, Q>
where
    S: EntityStore,
    Q: OutboundQueue,
{
    pub fn new(store: Arc<S>, queue: Arc<Q>, clock: Arc<MonotonicClock>) -> Self {
        Self {
            store,
            queue,
            clock,
            writer: Mutex::new(()),
        }
    }

    pub fn create(&self, input: NewCheckpoint) -> Result<Recorded<Checkpoint>, CoreError> {
        let _writer = lock(&self.writer)?;

        let checkpoint = Checkpoint::create(input, self.clock.now());
        Validator::validate_checkpoint(&checkpoint)?;
        ensure_station(self.store.as_ref(), &checkpoint.survey_station_id)?;

        self.store.save_checkpoint(&checkpoint)?;

        let change = Change::CheckpointCreated(checkpoint.to_dto());
        let event = self.queue.enqueue_change(&change).map_err(|e| {
            rollback("create", checkpoint.id, e, || {
                self.store.delete_checkpoint(checkpoint.id)
            })
        })?;

        tracing::info!(
            id = %checkpoint.id,
            sequence = event.sequence,
            "checkpoint created"
        );
        Ok(Recorded::new(checkpoint, event))
    }

    /// Apply `patch` to an existing checkpoint. An empty patch still refreshes
    /// `updated_at` and queues an update.
    pub fn edit(
        &self,
        id: Uuid,
        patch: &CheckpointPatch,
    ) -> Result<Recorded<Checkpoint>, CoreError> {
        let _writer = lock(&self.writer)?;

        let previous = self.store.get_checkpoint(id)?;

        let mut updated = previous.clone();
        patch.apply(&mut updated);
        Validator::validate_checkpoint(&updated)?;
        if updated.survey_station_id != previous.survey_station_id {
            ensure_station(self.store.as_ref(), &updated.survey_station_id)?;
        }
        updated.updated_at = self.clock.now_after(previous.updated_at);

        self.store.save_checkpoint(&updated)?;

        let change = Change::CheckpointUpdated(updated.to_dto());
        let event = self.queue.enqueue_change(&change).map_err(|e| {
            rollback("edit", id, e, || self.store.save_checkpoint(&previous))
        })?;

        tracing::info!(%id, sequence = event.sequence, "checkpoint updated");
        Ok(Recorded::new(updated, event))
    }

    /// Delete a checkpoint, returning the removed row with its event.
    pub fn delete(&self, id: Uuid) -> Result<Recorded<Checkpoint>, CoreError> {
        let _writer = lock(&self.writer)?;

        let removed = self.store.delete_checkpoint(id)?;

        let change = Change::CheckpointDeleted(DeletedRef { id });
        let event = self.queue.enqueue_change(&change).map_err(|e| {
            rollback("delete", id, e, || self.store.save_checkpoint(&removed))
        })?;

        tracing::info!(%id, sequence = event.sequence, "checkpoint deleted");
        Ok(Recorded::new(removed, event))
    }

    pub fn get(&self, id: Uuid) -> Result<Checkpoint, CoreError> {
        Ok(self.store.get_checkpoint(id)?)
    }

    pub fn list(&self, filter: &CheckpointFilter) -> Result<Vec<Checkpoint>, CoreError> {
        Ok(self.store.list_checkpoints(filter)?)
    }
}

/// The referenced survey station must exist.
pub(crate) fn ensure_station<S: EntityStore + ?Sized>(
    store: &S,
    station_id: &str,
) -> Result<(), CoreError> {
    match store.get_station(station_id) {
        Ok(_) => Ok(()),
        Err(StorageError::StationNotFound(id)) => Err(ValidationError::UnknownStation(id).into()),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn lock(writer: &Mutex<()>) -> Result<MutexGuard<'_, ()>, CoreError> {
    writer
        .lock()
        .map_err(|_| StorageError::Database("writer lock poisoned".to_string()).into())
}

/// Undo a store write after its enqueue failed and hand back the enqueue error.
pub(crate) fn rollback<T>(
    op: &'static str,
    id: Uuid,
    cause: StorageError,
    undo: impl FnOnce() -> Result<T, StorageError>,
) -> CoreError {
    tracing::warn!(op, %id, error = %cause, "enqueue failed, rolling back store write");
    if let Err(e) = undo() {
        tracing::error!(op, %id, error = %e, "rollback failed, store and queue disagree");
    }
    cause.into()
}
