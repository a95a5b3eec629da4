use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Morphology of the cave passage at a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PassageType {
    Canyon,
    Tube,
    Keyhole,
    Pit,
    Crawl,
    Room,
}

impl PassageType {
    pub const ALL: [PassageType; 6] = [
        PassageType::Canyon,
        PassageType::Tube,
        PassageType::Keyhole,
        PassageType::Pit,
        PassageType::Crawl,
        PassageType::Room,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PassageType::Canyon => "CANYON",
            PassageType::Tube => "TUBE",
            PassageType::Keyhole => "KEYHOLE",
            PassageType::Pit => "PIT",
            PassageType::Crawl => "CRAWL",
            PassageType::Room => "ROOM",
        }
    }
}

impl std::fmt::Display for PassageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PassageType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PassageType::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::UnknownPassageType(s.to_string()))
    }
}

/// Input for creating a checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCheckpoint {
    pub name: String,
    pub passage_type: PassageType,
    pub survey_station_id: String,
    pub depth_from_entrance: f64,
    pub distance_from_station: f64,
}

impl NewCheckpoint {
    pub fn new(
        name: impl Into<String>,
        passage_type: PassageType,
        survey_station_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            passage_type,
            survey_station_id: survey_station_id.into(),
            depth_from_entrance: 0.0,
            distance_from_station: 0.0,
        }
    }

    pub fn with_depth(mut self, depth: f64) -> Self {
        self.depth_from_entrance = depth;
        self
    }

    pub fn with_distance(mut self, distance: f64) -> Self {
        self.distance_from_station = distance;
        self
    }
}

/// A user-defined survey point where readings are captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: Uuid,
    pub name: String,
    pub passage_type: PassageType,
    pub survey_station_id: String,
    pub depth_from_entrance: f64,
    pub distance_from_station: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Build a fresh checkpoint with a new id, stamped at `now`.
    pub fn create(input: NewCheckpoint, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: input.name,
            passage_type: input.passage_type,
            survey_station_id: input.survey_station_id,
            depth_from_entrance: input.depth_from_entrance,
            distance_from_station: input.distance_from_station,
            created_at: now,
            updated_at: now,
        }
    }

    /// Snapshot for the outbound queue.
    pub fn to_dto(&self) -> CheckpointDto {
        CheckpointDto {
            id: self.id,
            name: self.name.clone(),
            passage_type: self.passage_type,
            survey_station_id: self.survey_station_id.clone(),
            depth_from_entrance: round3(self.depth_from_entrance),
            distance_from_station: round3(self.distance_from_station),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Wire shape of a checkpoint inside a queued change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointDto {
    pub id: Uuid,
    pub name: String,
    pub passage_type: PassageType,
    pub survey_station_id: String,
    pub depth_from_entrance: f64,
    pub distance_from_station: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update applied by the edit use case. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckpointPatch {
    pub name: Option<String>,
    pub passage_type: Option<PassageType>,
    pub survey_station_id: Option<String>,
    pub depth_from_entrance: Option<f64>,
    pub distance_from_station: Option<f64>,
}

impl CheckpointPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn passage_type(mut self, passage_type: PassageType) -> Self {
        self.passage_type = Some(passage_type);
        self
    }

    pub fn survey_station_id(mut self, station_id: impl Into<String>) -> Self {
        self.survey_station_id = Some(station_id.into());
        self
    }

    pub fn depth_from_entrance(mut self, depth: f64) -> Self {
        self.depth_from_entrance = Some(depth);
        self
    }

    pub fn distance_from_station(mut self, distance: f64) -> Self {
        self.distance_from_station = Some(distance);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Copy the set fields onto `checkpoint`. Timestamps are left to the caller.
    pub fn apply(&self, checkpoint: &mut Checkpoint) {
        if let Some(name) = &self.name {
            checkpoint.name = name.clone();
        }
        if let Some(passage_type) = self.passage_type {
            checkpoint.passage_type = passage_type;
        }
        if let Some(station_id) = &self.survey_station_id {
            checkpoint.survey_station_id = station_id.clone();
        }
        if let Some(depth) = self.depth_from_entrance {
            checkpoint.depth_from_entrance = depth;
        }
        if let Some(distance) = self.distance_from_station {
            checkpoint.distance_from_station = distance;
        }
    }
}

/// Selection for listing checkpoints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckpointFilter {
    pub survey_station_id: Option<String>,
    pub passage_type: Option<PassageType>,
}

impl CheckpointFilter {
    /// Matches every checkpoint.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn at_station(station_id: impl Into<String>) -> Self {
        Self {
            survey_station_id: Some(station_id.into()),
            passage_type: None,
        }
    }

    pub fn with_passage_type(mut self, passage_type: PassageType) -> Self {
        self.passage_type = Some(passage_type);
        self
    }

    pub fn matches(&self, checkpoint: &Checkpoint) -> bool {
        self.survey_station_id
            .as_deref()
            .map_or(true, |s| s == checkpoint.survey_station_id)
            && self
                .passage_type
                .map_or(true, |p| p == checkpoint.passage_type)
    }
}

/// Order checkpoints by creation time, then id, as listings return them.
pub fn sort_checkpoints(checkpoints: &mut [Checkpoint]) {
    checkpoints.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

pub(crate) fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Checkpoint {
        Checkpoint::create(
            NewCheckpoint::new("Entrance Pit", PassageType::Pit, "A1")
                .with_depth(3.14159)
                .with_distance(2.0),
            Utc::now(),
        )
    }

    #[test]
    fn test_passage_type_parse() {
        assert_eq!("pit".parse::<PassageType>().unwrap(), PassageType::Pit);
        assert_eq!(" ROOM ".parse::<PassageType>().unwrap(), PassageType::Room);
        assert_eq!(
            "chimney".parse::<PassageType>(),
            Err(ValidationError::UnknownPassageType("chimney".to_string()))
        );
    }

    #[test]
    fn test_passage_type_serializes_upper_case() {
        let json = serde_json::to_string(&PassageType::Keyhole).unwrap();
        assert_eq!(json, "\"KEYHOLE\"");
    }

    #[test]
    fn test_create_sets_equal_timestamps() {
        let cp = sample();
        assert_eq!(cp.created_at, cp.updated_at);
        assert_eq!(cp.depth_from_entrance, 3.14159);
    }

    #[test]
    fn test_dto_rounds_numeric_fields() {
        let dto = sample().to_dto();
        assert_eq!(dto.depth_from_entrance, 3.142);
        assert_eq!(dto.distance_from_station, 2.0);
    }

    #[test]
    fn test_patch_applies_only_set_fields() {
        let mut cp = sample();
        let patch = CheckpointPatch::new().depth_from_entrance(12.5);
        assert!(!patch.is_empty());

        patch.apply(&mut cp);

        assert_eq!(cp.depth_from_entrance, 12.5);
        assert_eq!(cp.name, "Entrance Pit");
        assert_eq!(cp.passage_type, PassageType::Pit);
    }

    #[test]
    fn test_filter_matches() {
        let cp = sample();

        assert!(CheckpointFilter::all().matches(&cp));
        assert!(CheckpointFilter::at_station("A1").matches(&cp));
        assert!(!CheckpointFilter::at_station("B5").matches(&cp));
        assert!(!CheckpointFilter::at_station("A1")
            .with_passage_type(PassageType::Crawl)
            .matches(&cp));
    }
}
