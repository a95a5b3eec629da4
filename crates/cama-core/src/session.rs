use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checkpoint::round3;
use crate::error::SessionError;

/// Version tag carried by every uploaded session payload.
pub const SESSION_SCHEMA_VERSION: u32 = 1;

/// One sample from a four-gas meter. Immutable once captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasReading {
    pub o2_pct: f64,
    pub co_ppm: f64,
    pub h2s_ppm: f64,
    pub lel_pct: f64,
    pub captured_at: DateTime<Utc>,
    pub checkpoint_id: Option<Uuid>,
}

impl GasReading {
    pub fn new(
        o2_pct: f64,
        co_ppm: f64,
        h2s_ppm: f64,
        lel_pct: f64,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            o2_pct,
            co_ppm,
            h2s_ppm,
            lel_pct,
            captured_at,
            checkpoint_id: None,
        }
    }

    /// Attach the reading to the checkpoint it was taken at.
    pub fn at_checkpoint(mut self, checkpoint_id: Uuid) -> Self {
        self.checkpoint_id = Some(checkpoint_id);
        self
    }

    fn to_dto(&self) -> GasReadingDto {
        GasReadingDto {
            captured_at: self.captured_at,
            o2_pct: round3(self.o2_pct),
            co_ppm: round3(self.co_ppm),
            h2s_ppm: round3(self.h2s_ppm),
            lel_pct: round3(self.lel_pct),
            checkpoint_id: self.checkpoint_id,
        }
    }
}

/// A run of readings anchored at a survey station.
///
/// Readings can only be appended while the session is open; `end` closes it
/// for good.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingSession {
    id: Uuid,
    anchor_station_id: String,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    readings: Vec<GasReading>,
}

impl SamplingSession {
    pub fn new(anchor_station_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            anchor_station_id: anchor_station_id.into(),
            started_at,
            ended_at: None,
            readings: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn anchor_station_id(&self) -> &str {
        &self.anchor_station_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn readings(&self) -> &[GasReading] {
        &self.readings
    }

    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Append a reading. Fails once the session has been ended.
    pub fn add_reading(&mut self, reading: GasReading) -> Result<(), SessionError> {
        if !self.is_open() {
            return Err(SessionError::Closed(self.id));
        }
        self.readings.push(reading);
        Ok(())
    }

    /// Close the session. Closing twice is an error.
    pub fn end(&mut self, at: DateTime<Utc>) -> Result<(), SessionError> {
        if !self.is_open() {
            return Err(SessionError::Closed(self.id));
        }
        self.ended_at = Some(at.max(self.started_at));
        Ok(())
    }

    /// Snapshot for the outbound queue.
    pub fn to_dto(&self) -> SessionDto {
        SessionDto {
            schema_version: SESSION_SCHEMA_VERSION,
            id: self.id,
            anchor_station_id: self.anchor_station_id.clone(),
            started_at: self.started_at,
            ended_at: self.ended_at,
            readings: self.readings.iter().map(GasReading::to_dto).collect(),
            reading_count: self.readings.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasReadingDto {
    pub captured_at: DateTime<Utc>,
    pub o2_pct: f64,
    pub co_ppm: f64,
    pub h2s_ppm: f64,
    pub lel_pct: f64,
    pub checkpoint_id: Option<Uuid>,
}

/// Wire shape of an uploaded session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDto {
    pub schema_version: u32,
    pub id: Uuid,
    pub anchor_station_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub readings: Vec<GasReadingDto>,
    pub reading_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(o2: f64) -> GasReading {
        GasReading::new(o2, 2.0, 0.5, 1.0, Utc::now())
    }

    #[test]
    fn test_add_reading_while_open() {
        let mut session = SamplingSession::new("A1", Utc::now());

        session.add_reading(reading(20.9)).unwrap();
        session.add_reading(reading(20.5)).unwrap();

        assert!(session.is_open());
        assert_eq!(session.readings().len(), 2);
        assert_eq!(session.readings()[1].o2_pct, 20.5);
    }

    #[test]
    fn test_add_reading_after_end_rejected() {
        let mut session = SamplingSession::new("A1", Utc::now());
        session.add_reading(reading(20.9)).unwrap();
        session.end(Utc::now()).unwrap();

        let result = session.add_reading(reading(19.0));

        assert_eq!(result, Err(SessionError::Closed(session.id())));
        assert_eq!(session.readings().len(), 1);
    }

    #[test]
    fn test_end_is_one_way() {
        let mut session = SamplingSession::new("A1", Utc::now());
        session.end(Utc::now()).unwrap();
        let ended_at = session.ended_at();

        assert!(session.end(Utc::now()).is_err());
        assert_eq!(session.ended_at(), ended_at);
    }

    #[test]
    fn test_end_never_precedes_start() {
        let start = Utc::now();
        let mut session = SamplingSession::new("A1", start);

        session.end(start - chrono::Duration::seconds(5)).unwrap();

        assert_eq!(session.ended_at(), Some(start));
    }

    #[test]
    fn test_dto_counts_and_rounds() {
        let mut session = SamplingSession::new("B5", Utc::now());
        let cp = Uuid::new_v4();
        session
            .add_reading(GasReading::new(20.91234, 1.0, 0.0, 0.0, Utc::now()).at_checkpoint(cp))
            .unwrap();

        let dto = session.to_dto();

        assert_eq!(dto.schema_version, 1);
        assert_eq!(dto.reading_count, 1);
        assert_eq!(dto.readings[0].o2_pct, 20.912);
        assert_eq!(dto.readings[0].checkpoint_id, Some(cp));
        assert!(dto.ended_at.is_none());
    }
}
