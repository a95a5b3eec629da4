//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};

use cama_core::{
    InMemoryEntityStore, InMemoryOutboundQueue, OutboundQueue, QueueItemKind, QueuedItem,
    StorageError,
};

use crate::state::default_stations;

/// In-memory store holding the default survey stations.
pub fn station_store() -> InMemoryEntityStore {
    InMemoryEntityStore::with_stations(default_stations())
}

/// Queue whose enqueue can be switched to fail, as if the disk filled up.
#[derive(Default)]
pub struct FlakyQueue {
    inner: InMemoryOutboundQueue,
    failing: AtomicBool,
}

impl FlakyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl OutboundQueue for FlakyQueue {
    fn enqueue(
        &self,
        kind: QueueItemKind,
        payload: serde_json::Value,
    ) -> Result<QueuedItem, StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Database("no space left on device".to_string()));
        }
        self.inner.enqueue(kind, payload)
    }

    fn take_batch(&self, max_items: usize) -> Result<Vec<QueuedItem>, StorageError> {
        self.inner.take_batch(max_items)
    }

    fn purge(&self, sequences: &[u64]) -> Result<usize, StorageError> {
        self.inner.purge(sequences)
    }

    fn len(&self) -> Result<usize, StorageError> {
        self.inner.len()
    }
}
