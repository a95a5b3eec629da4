use uuid::Uuid;

use crate::checkpoint::{Checkpoint, CheckpointFilter};
use crate::error::StorageError;
use crate::queue::{Change, QueueItemKind, QueuedItem};
use crate::session::SamplingSession;
use crate::station::{nearest_station, SurveyStation};

/// Durable keyed storage for checkpoints, sessions and stations.
///
/// Every write is durable before it returns. Implementations enforce storage
/// constraints only; business validation belongs to the use cases.
pub trait EntityStore: Send + Sync {
    /// Insert or overwrite a checkpoint. Returns its id.
    fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<Uuid, StorageError>;

    fn get_checkpoint(&self, id: Uuid) -> Result<Checkpoint, StorageError>;

    /// Remove a checkpoint, returning the removed row.
    fn delete_checkpoint(&self, id: Uuid) -> Result<Checkpoint, StorageError>;

    /// Checkpoints matching `filter`, ordered by creation time then id.
    fn list_checkpoints(&self, filter: &CheckpointFilter)
        -> Result<Vec<Checkpoint>, StorageError>;

    /// Insert or overwrite a session together with its readings.
    fn save_session(&self, session: &SamplingSession) -> Result<Uuid, StorageError>;

    fn get_session(&self, id: Uuid) -> Result<SamplingSession, StorageError>;

    fn delete_session(&self, id: Uuid) -> Result<SamplingSession, StorageError>;

    /// Sessions ordered by start time.
    fn list_sessions(&self) -> Result<Vec<SamplingSession>, StorageError>;

    fn upsert_station(&self, station: &SurveyStation) -> Result<(), StorageError>;

    fn get_station(&self, station_id: &str) -> Result<SurveyStation, StorageError>;

    /// Stations ordered by station id.
    fn list_stations(&self) -> Result<Vec<SurveyStation>, StorageError>;
}

/// Read-only station lookups.
pub trait StationDirectory {
    fn nearest(&self, x: f64, y: f64, z: f64) -> Result<Option<SurveyStation>, StorageError>;
}

impl<T: EntityStore + ?Sized> StationDirectory for T {
    fn nearest(&self, x: f64, y: f64, z: f64) -> Result<Option<SurveyStation>, StorageError> {
        Ok(nearest_station(self.list_stations()?, x, y, z))
    }
}

/// Durable FIFO log of pending changes.
///
/// `take_batch` is a peek; only `purge` removes items. Together they give
/// at-least-once delivery.
pub trait OutboundQueue: Send + Sync {
    /// Append atomically and assign the next sequence number.
    fn enqueue(
        &self,
        kind: QueueItemKind,
        payload: serde_json::Value,
    ) -> Result<QueuedItem, StorageError>;

    /// Up to `max_items` items in ascending sequence order, without removing them.
    fn take_batch(&self, max_items: usize) -> Result<Vec<QueuedItem>, StorageError>;

    /// Remove exactly the given sequence numbers. Unknown ones are ignored.
    /// Returns how many items were actually removed.
    fn purge(&self, sequences: &[u64]) -> Result<usize, StorageError>;

    fn len(&self) -> Result<usize, StorageError>;

    fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// Serialize a domain change and enqueue it.
    fn enqueue_change(&self, change: &Change) -> Result<QueuedItem, StorageError> {
        self.enqueue(change.kind(), change.to_payload()?)
    }
}

// In-memory implementations for testing
#[cfg(any(test, feature = "test-utils"))]
pub mod memory {
    use super::*;
    use crate::checkpoint::sort_checkpoints;
    use chrono::Utc;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::RwLock;

    /// In-memory entity store for testing.
    #[derive(Default)]
    pub struct InMemoryEntityStore {
        checkpoints: RwLock<HashMap<Uuid, Checkpoint>>,
        sessions: RwLock<HashMap<Uuid, SamplingSession>>,
        stations: RwLock<BTreeMap<String, SurveyStation>>,
    }

    impl InMemoryEntityStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Store pre-populated with the given stations.
        pub fn with_stations(stations: impl IntoIterator<Item = SurveyStation>) -> Self {
            let store = Self::new();
            {
                let mut map = store.stations.write().unwrap();
                for st in stations {
                    map.insert(st.station_id.clone(), st);
                }
            }
            store
        }
    }

    impl EntityStore for InMemoryEntityStore {
        fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<Uuid, StorageError> {
            self.checkpoints
                .write()
                .unwrap()
                .insert(checkpoint.id, checkpoint.clone());
            Ok(checkpoint.id)
        }

        fn get_checkpoint(&self, id: Uuid) -> Result<Checkpoint, StorageError> {
            self.checkpoints
                .read()
                .unwrap()
                .get(&id)
                .cloned()
                .ok_or(StorageError::CheckpointNotFound(id))
        }

        fn delete_checkpoint(&self, id: Uuid) -> Result<Checkpoint, StorageError> {
            self.checkpoints
                .write()
                .unwrap()
                .remove(&id)
                .ok_or(StorageError::CheckpointNotFound(id))
        }

        fn list_checkpoints(
            &self,
            filter: &CheckpointFilter,
        ) -> Result<Vec<Checkpoint>, StorageError> {
            let mut out: Vec<_> = self
                .checkpoints
                .read()
                .unwrap()
                .values()
                .filter(|c| filter.matches(c))
                .cloned()
                .collect();
            sort_checkpoints(&mut out);
            Ok(out)
        }

        fn save_session(&self, session: &SamplingSession) -> Result<Uuid, StorageError> {
            self.sessions
                .write()
                .unwrap()
                .insert(session.id(), session.clone());
            Ok(session.id())
        }

        fn get_session(&self, id: Uuid) -> Result<SamplingSession, StorageError> {
            self.sessions
                .read()
                .unwrap()
                .get(&id)
                .cloned()
                .ok_or(StorageError::SessionNotFound(id))
        }

        fn delete_session(&self, id: Uuid) -> Result<SamplingSession, StorageError> {
            self.sessions
                .write()
                .unwrap()
                .remove(&id)
                .ok_or(StorageError::SessionNotFound(id))
        }

        fn list_sessions(&self) -> Result<Vec<SamplingSession>, StorageError> {
            let mut out: Vec<_> = self.sessions.read().unwrap().values().cloned().collect();
            out.sort_by_key(|s| (s.started_at(), s.id()));
            Ok(out)
        }

        fn upsert_station(&self, station: &SurveyStation) -> Result<(), StorageError> {
            self.stations
                .write()
                .unwrap()
                .insert(station.station_id.clone(), station.clone());
            Ok(())
        }

        fn get_station(&self, station_id: &str) -> Result<SurveyStation, StorageError> {
            self.stations
                .read()
                .unwrap()
                .get(station_id)
                .cloned()
                .ok_or_else(|| StorageError::StationNotFound(station_id.to_string()))
        }

        fn list_stations(&self) -> Result<Vec<SurveyStation>, StorageError> {
            Ok(self.stations.read().unwrap().values().cloned().collect())
        }
    }

    #[derive(Default)]
    struct QueueState {
        items: BTreeMap<u64, QueuedItem>,
        last_sequence: u64,
    }

    /// In-memory outbound queue for testing.
    #[derive(Default)]
    pub struct InMemoryOutboundQueue {
        state: RwLock<QueueState>,
    }

    impl InMemoryOutboundQueue {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl OutboundQueue for InMemoryOutboundQueue {
        fn enqueue(
            &self,
            kind: QueueItemKind,
            payload: serde_json::Value,
        ) -> Result<QueuedItem, StorageError> {
            let mut state = self.state.write().unwrap();

            // Sequence and insert under the same lock
            let sequence = state.last_sequence + 1;
            let item = QueuedItem {
                sequence,
                kind,
                payload,
                enqueued_at: Utc::now(),
            };
            state.items.insert(sequence, item.clone());
            state.last_sequence = sequence;

            Ok(item)
        }

        fn take_batch(&self, max_items: usize) -> Result<Vec<QueuedItem>, StorageError> {
            let state = self.state.read().unwrap();
            Ok(state.items.values().take(max_items).cloned().collect())
        }

        fn purge(&self, sequences: &[u64]) -> Result<usize, StorageError> {
            let mut state = self.state.write().unwrap();
            Ok(sequences
                .iter()
                .filter(|seq| state.items.remove(*seq).is_some())
                .count())
        }

        fn len(&self) -> Result<usize, StorageError> {
            Ok(self.state.read().unwrap().items.len())
        }
    }

}
