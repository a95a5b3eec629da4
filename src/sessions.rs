use std::sync::{Arc, Mutex};

use uuid::Uuid;

use cama_core::{
    Change, CoreError, EntityStore, GasReading, MeterSource, MonotonicClock, OutboundQueue,
    Recorded, SamplingSession, SessionDto, SessionError, Validator,
};

use crate::checkpoints::{ensure_station, lock, rollback};

/// Gas sampling use cases. Sessions live in memory while readings are
/// captured and are persisted and queued together on upload.
pub struct SessionService<S, Q>
where
    S: EntityStore,
    Q: OutboundQueue,
{
    store: Arc<S>,
    queue: Arc<Q>,
    clock: Arc<MonotonicClock>,
    writer: Mutex<()>,
}

impl<S, Q> SessionService<S, Q>
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

    /// Open a session anchored at an existing survey station.
    pub fn start(&self, anchor_station_id: &str) -> Result<SamplingSession, CoreError> {
        Validator::validate_station_id(anchor_station_id)?;
        ensure_station(self.store.as_ref(), anchor_station_id)?;

        let session = SamplingSession::new(anchor_station_id, self.clock.now());
        tracing::debug!(id = %session.id(), anchor = anchor_station_id, "session started");
        Ok(session)
    }

    /// Take one reading from `meter` and append it to `session`.
    ///
    /// A closed session is rejected before the meter is touched. Implausible
    /// readings are rejected and not appended.
    pub fn record<M>(
        &self,
        session: &mut SamplingSession,
        meter: &M,
    ) -> Result<GasReading, CoreError>
    where
        M: MeterSource + ?Sized,
    {
        if !session.is_open() {
            return Err(SessionError::Closed(session.id()).into());
        }

        let reading = meter.next_reading()?;
        Validator::validate_reading(&reading)?;
        session.add_reading(reading.clone())?;

        Ok(reading)
    }

    pub fn end(&self, session: &mut SamplingSession) -> Result<(), CoreError> {
        session.end(self.clock.now())?;
        tracing::debug!(
            id = %session.id(),
            readings = session.readings().len(),
            "session ended"
        );
        Ok(())
    }

    /// Persist the session with its readings, then queue SESSION_UPLOAD.
    /// Uploading again overwrites the stored copy and queues a new snapshot.
    pub fn upload(&self, session: &SamplingSession) -> Result<Recorded<SessionDto>, CoreError> {
        let _writer = lock(&self.writer)?;
        let id = session.id();

        let previous = match self.store.get_session(id) {
            Ok(stored) => Some(stored),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };

        self.store.save_session(session)?;

        let dto = session.to_dto();
        let change = Change::SessionUploaded(dto.clone());
        let event = self.queue.enqueue_change(&change).map_err(|e| {
            rollback("upload", id, e, || match &previous {
                Some(stored) => self.store.save_session(stored).map(|_| ()),
                None => self.store.delete_session(id).map(|_| ()),
            })
        })?;

        tracing::info!(
            %id,
            readings = dto.reading_count,
            sequence = event.sequence,
            "session uploaded"
        );
        Ok(Recorded::new(dto, event))
    }

    pub fn get(&self, id: Uuid) -> Result<SamplingSession, CoreError> {
        Ok(self.store.get_session(id)?)
    }

    pub fn list(&self) -> Result<Vec<SamplingSession>, CoreError> {
        Ok(self.store.list_sessions()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{station_store, FlakyQueue};
    use cama_core::{
        InMemoryEntityStore, MeterError, QueueItemKind, ScriptedMeter, SimulatedMeter,
        ValidationError,
    };
    use chrono::Utc;

    type Service = SessionService<InMemoryEntityStore, FlakyQueue>;

    fn service() -> (Service, Arc<InMemoryEntityStore>, Arc<FlakyQueue>) {
        let store = Arc::new(station_store());
        let queue = Arc::new(FlakyQueue::new());
        let service = SessionService::new(
            store.clone(),
            queue.clone(),
            Arc::new(MonotonicClock::new()),
        );
        (service, store, queue)
    }

    fn reading(o2: f64, co: f64) -> GasReading {
        GasReading::new(o2, co, 0.0, 0.5, Utc::now())
    }

    #[test]
    fn test_start_requires_known_station() {
        let (service, _store, _queue) = service();

        let session = service.start("C12").unwrap();
        assert_eq!(session.anchor_station_id(), "C12");
        assert!(session.is_open());

        let err = service.start("X1").unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::UnknownStation(_))
        ));
        assert!(matches!(
            service.start(" ").unwrap_err(),
            CoreError::Validation(ValidationError::EmptyStationId)
        ));
    }

    #[test]
    fn test_record_validates_and_appends() {
        let (service, _store, _queue) = service();
        let meter = ScriptedMeter::new([reading(20.9, 2.0), reading(150.0, 0.0)]);
        let mut session = service.start("A1").unwrap();

        let first = service.record(&mut session, &meter).unwrap();
        assert_eq!(first.o2_pct, 20.9);

        let err = service.record(&mut session, &meter).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::ReadingOutOfRange { sensor: "o2_pct", .. })
        ));

        let err = service.record(&mut session, &meter).unwrap_err();
        assert!(matches!(err, CoreError::Meter(MeterError::Exhausted)));

        assert_eq!(session.readings().len(), 1);
    }

    #[test]
    fn test_disconnected_meter_appends_nothing() {
        let (service, _store, _queue) = service();
        let meter = SimulatedMeter::new();
        let mut session = service.start("B5").unwrap();

        service.record(&mut session, &meter).unwrap();
        meter.disconnect();
        let err = service.record(&mut session, &meter).unwrap_err();

        assert!(matches!(err, CoreError::Meter(MeterError::Disconnected(_))));
        assert_eq!(session.readings().len(), 1);
        assert!(session.is_open());
    }

    #[test]
    fn test_record_after_end_is_rejected() {
        let (service, _store, _queue) = service();
        let meter = ScriptedMeter::new([reading(20.9, 0.0)]);
        let mut session = service.start("A1").unwrap();
        service.end(&mut session).unwrap();

        let err = service.record(&mut session, &meter).unwrap_err();

        assert!(matches!(err, CoreError::Session(SessionError::Closed(id)) if id == session.id()));
        assert_eq!(meter.remaining(), 1);
        assert!(service.end(&mut session).is_err());
    }

    #[test]
    fn test_upload_persists_and_queues_snapshot() {
        let (service, store, queue) = service();
        let meter = ScriptedMeter::new([reading(20.9, 1.0), reading(20.1, 3.0)]);
        let mut session = service.start("B5").unwrap();
        service.record(&mut session, &meter).unwrap();
        service.record(&mut session, &meter).unwrap();
        service.end(&mut session).unwrap();

        let recorded = service.upload(&session).unwrap();

        assert_eq!(store.get_session(session.id()).unwrap(), session);
        assert_eq!(recorded.value.reading_count, 2);
        assert_eq!(recorded.event.kind, QueueItemKind::SessionUpload);
        assert_eq!(recorded.event.payload["schema_version"], 1);
        assert_eq!(recorded.event.payload["anchor_station_id"], "B5");
        assert_eq!(recorded.event.entity_id(), Some(session.id()));
        assert_eq!(queue.len().unwrap(), 1);
        assert_eq!(service.list().unwrap(), vec![session]);
    }

    #[test]
    fn test_failed_first_upload_leaves_no_row() {
        let (service, store, queue) = service();
        let session = service.start("A1").unwrap();
        queue.set_failing(true);

        assert!(service.upload(&session).is_err());

        assert!(store.get_session(session.id()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_failed_reupload_restores_previous_copy() {
        let (service, _store, queue) = service();
        let meter = ScriptedMeter::new([reading(20.9, 0.0)]);
        let mut session = service.start("A1").unwrap();
        service.upload(&session).unwrap();

        service.record(&mut session, &meter).unwrap();
        queue.set_failing(true);
        assert!(service.upload(&session).is_err());

        let stored = service.get(session.id()).unwrap();
        assert!(stored.readings().is_empty());
        queue.set_failing(false);
        assert_eq!(queue.len().unwrap(), 1);
    }
}
