use std::sync::Arc;

use cama_core::{EntityStore, MonotonicClock, StorageError, SurveyStation};
use cama_db::{init_database, RedbEntityStore, RedbOutboundQueue};
use cama_sync::{FileSink, RecoveryHelper, SyncEngine};

use crate::checkpoints::CheckpointService;
use crate::config::Config;
use crate::sessions::SessionService;

pub type Checkpoints = CheckpointService<RedbEntityStore, RedbOutboundQueue>;
pub type Sessions = SessionService<RedbEntityStore, RedbOutboundQueue>;
pub type Engine = SyncEngine<RedbOutboundQueue, FileSink>;
pub type Recovery = RecoveryHelper<RedbEntityStore, RedbOutboundQueue>;

/// Everything the daemon needs, wired over one database file.
pub struct App {
    pub store: Arc<RedbEntityStore>,
    pub queue: Arc<RedbOutboundQueue>,
    pub sink: Arc<FileSink>,
    pub checkpoints: Checkpoints,
    pub sessions: Sessions,
    pub engine: Arc<Engine>,
}

impl App {
    pub fn open(config: &Config) -> Result<Self, StorageError> {
        let db = init_database(&config.db_path)?;

        let store = Arc::new(RedbEntityStore::new(db.clone()));
        let queue = Arc::new(RedbOutboundQueue::new(db));
        let sink = Arc::new(FileSink::new(&config.inbox_path));
        let clock = Arc::new(MonotonicClock::new());

        let checkpoints = CheckpointService::new(store.clone(), queue.clone(), clock.clone());
        let sessions = SessionService::new(store.clone(), queue.clone(), clock);
        let engine = Arc::new(SyncEngine::new(
            queue.clone(),
            sink.clone(),
            config.sync_policy(),
        ));

        Ok(Self {
            store,
            queue,
            sink,
            checkpoints,
            sessions,
            engine,
        })
    }

    pub fn recovery(&self) -> Recovery {
        RecoveryHelper::new(self.store.clone(), self.queue.clone())
    }
}

/// Reference stations shipped with the app.
pub fn default_stations() -> Vec<SurveyStation> {
    [
        ("A1", 0.0, 0.0, 0.0),
        ("B5", 10.0, 2.0, 0.0),
        ("C12", 25.0, -3.0, -1.0),
        ("Z78", 100.0, 0.0, -5.0),
    ]
    .into_iter()
    .map(|(id, x, y, z)| SurveyStation::new(id, id, x, y, z))
    .collect()
}

/// Insert the default stations if the store has none. Returns how many were added.
pub fn seed_default_stations<S: EntityStore + ?Sized>(store: &S) -> Result<usize, StorageError> {
    if !store.list_stations()?.is_empty() {
        return Ok(0);
    }

    let stations = default_stations();
    for station in &stations {
        store.upsert_station(station)?;
    }
    Ok(stations.len())
}
