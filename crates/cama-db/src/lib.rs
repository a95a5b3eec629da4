//! CAMA DB - redb implementation of the entity store and outbound queue.
//!
//! Both stores share one database file. redb commits with immediate
//! durability, so a write is on disk before the call returns.

pub mod entity_store;
pub mod queue_store;
pub mod tables;

pub use entity_store::RedbEntityStore;
pub use queue_store::RedbOutboundQueue;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use redb::Database;
use serde::de::DeserializeOwned;
use serde::Serialize;

use cama_core::StorageError;

/// Initialize a database with all required tables.
pub fn init_database(path: impl AsRef<Path>) -> Result<Arc<Database>, StorageError> {
    let db = Database::create(path).map_err(db_err)?;

    RedbEntityStore::init_tables(&db)?;
    RedbOutboundQueue::init_tables(&db)?;

    Ok(Arc::new(db))
}

pub(crate) fn db_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::Database(e.to_string())
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(value).map_err(db_err)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    serde_json::from_slice(bytes).map_err(db_err)
}

/// Serialize writers within the process; redb's own write lock is not relied on.
pub(crate) fn lock_writer(writer: &Mutex<()>) -> Result<MutexGuard<'_, ()>, StorageError> {
    writer
        .lock()
        .map_err(|_| StorageError::Database("writer lock poisoned".to_string()))
}
