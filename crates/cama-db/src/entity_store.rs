use std::sync::{Arc, Mutex};

use redb::{Database, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use cama_core::checkpoint::sort_checkpoints;
use cama_core::{
    Checkpoint, CheckpointFilter, EntityStore, SamplingSession, StorageError, SurveyStation,
};

use crate::tables::{CHECKPOINTS_TABLE, SESSIONS_TABLE, STATIONS_TABLE};
use crate::{db_err, decode, encode, lock_writer};

type BlobTable = TableDefinition<'static, &'static [u8], &'static [u8]>;

/// redb implementation of EntityStore.
pub struct RedbEntityStore {
    db: Arc<Database>,
    writer: Mutex<()>,
}

impl RedbEntityStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            writer: Mutex::new(()),
        }
    }

    /// Initialize the database tables.
    pub fn init_tables(db: &Database) -> Result<(), StorageError> {
        let write_txn = db.begin_write().map_err(db_err)?;
        {
            // Create tables if they don't exist
            let _ = write_txn.open_table(CHECKPOINTS_TABLE).map_err(db_err)?;
            let _ = write_txn.open_table(SESSIONS_TABLE).map_err(db_err)?;
            let _ = write_txn.open_table(STATIONS_TABLE).map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;
        Ok(())
    }

    fn put<T: Serialize>(
        &self,
        def: BlobTable,
        key: &[u8],
        value: &T,
    ) -> Result<(), StorageError> {
        let value = encode(value)?;
        let _writer = lock_writer(&self.writer)?;

        let write_txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = write_txn.open_table(def).map_err(db_err)?;
            table.insert(key, value.as_slice()).map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;

        Ok(())
    }

    fn fetch<T: DeserializeOwned>(
        &self,
        def: BlobTable,
        key: &[u8],
    ) -> Result<Option<T>, StorageError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(def).map_err(db_err)?;

        let found = match table.get(key).map_err(db_err)? {
            Some(value) => Some(decode(value.value())?),
            None => None,
        };
        Ok(found)
    }

    /// Remove a row and return what it held. Nothing is committed when the
    /// key is absent.
    fn take<T: DeserializeOwned>(
        &self,
        def: BlobTable,
        key: &[u8],
    ) -> Result<Option<T>, StorageError> {
        let _writer = lock_writer(&self.writer)?;

        let write_txn = self.db.begin_write().map_err(db_err)?;
        let removed = {
            let mut table = write_txn.open_table(def).map_err(db_err)?;
            let guard = table.remove(key).map_err(db_err)?;
            let removed: Option<T> = match guard {
                Some(value) => Some(decode(value.value())?),
                None => None,
            };
            removed
        };

        if removed.is_some() {
            write_txn.commit().map_err(db_err)?;
        }

        Ok(removed)
    }

    fn scan<T: DeserializeOwned>(&self, def: BlobTable) -> Result<Vec<T>, StorageError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(def).map_err(db_err)?;

        let mut rows = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (_, value) = entry.map_err(db_err)?;
            rows.push(decode(value.value())?);
        }

        Ok(rows)
    }
}

impl EntityStore for RedbEntityStore {
    fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<Uuid, StorageError> {
        self.put(CHECKPOINTS_TABLE, checkpoint.id.as_bytes(), checkpoint)?;
        Ok(checkpoint.id)
    }

    fn get_checkpoint(&self, id: Uuid) -> Result<Checkpoint, StorageError> {
        self.fetch(CHECKPOINTS_TABLE, id.as_bytes())?
            .ok_or(StorageError::CheckpointNotFound(id))
    }

    fn delete_checkpoint(&self, id: Uuid) -> Result<Checkpoint, StorageError> {
        self.take(CHECKPOINTS_TABLE, id.as_bytes())?
            .ok_or(StorageError::CheckpointNotFound(id))
    }

    fn list_checkpoints(
        &self,
        filter: &CheckpointFilter,
    ) -> Result<Vec<Checkpoint>, StorageError> {
        let mut checkpoints: Vec<Checkpoint> = self
            .scan(CHECKPOINTS_TABLE)?
            .into_iter()
            .filter(|c| filter.matches(c))
            .collect();
        sort_checkpoints(&mut checkpoints);
        Ok(checkpoints)
    }

    fn save_session(&self, session: &SamplingSession) -> Result<Uuid, StorageError> {
        self.put(SESSIONS_TABLE, session.id().as_bytes(), session)?;
        Ok(session.id())
    }

    fn get_session(&self, id: Uuid) -> Result<SamplingSession, StorageError> {
        self.fetch(SESSIONS_TABLE, id.as_bytes())?
            .ok_or(StorageError::SessionNotFound(id))
    }

    fn delete_session(&self, id: Uuid) -> Result<SamplingSession, StorageError> {
        self.take(SESSIONS_TABLE, id.as_bytes())?
            .ok_or(StorageError::SessionNotFound(id))
    }

    fn list_sessions(&self) -> Result<Vec<SamplingSession>, StorageError> {
        let mut sessions: Vec<SamplingSession> = self.scan(SESSIONS_TABLE)?;
        sessions.sort_by_key(|s| (s.started_at(), s.id()));
        Ok(sessions)
    }

    fn upsert_station(&self, station: &SurveyStation) -> Result<(), StorageError> {
        if station.station_id.is_empty() {
            return Err(StorageError::Database(
                "station_id is a required column".to_string(),
            ));
        }
        self.put(STATIONS_TABLE, station.station_id.as_bytes(), station)
    }

    fn get_station(&self, station_id: &str) -> Result<SurveyStation, StorageError> {
        self.fetch(STATIONS_TABLE, station_id.as_bytes())?
            .ok_or_else(|| StorageError::StationNotFound(station_id.to_string()))
    }

    fn list_stations(&self) -> Result<Vec<SurveyStation>, StorageError> {
        self.scan(STATIONS_TABLE)
    }
}
