use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Meter error: {0}")]
    Meter(#[from] MeterError),
}

impl CoreError {
    /// Whether the operation failed because a referenced record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::Storage(e) if e.is_not_found())
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Checkpoint name cannot be empty")]
    EmptyName,

    #[error("Survey station id cannot be empty")]
    EmptyStationId,

    #[error("Unknown survey station: {0}")]
    UnknownStation(String),

    #[error("Invalid depth_from_entrance {0}: must be a finite number >= 0")]
    InvalidDepth(f64),

    #[error("Invalid distance_from_station {0}: must be a finite number >= 0")]
    InvalidDistance(f64),

    #[error("Unknown passage type: {0}")]
    UnknownPassageType(String),

    #[error("Implausible {sensor} reading: {value}")]
    ReadingOutOfRange { sensor: &'static str, value: f64 },
}

#[derive(Error, Debug, PartialEq)]
pub enum SessionError {
    #[error("Sampling session {0} is closed")]
    Closed(Uuid),
}

#[derive(Error, Debug, PartialEq)]
pub enum MeterError {
    #[error("Meter has no reading available")]
    Exhausted,

    #[error("Meter disconnected: {0}")]
    Disconnected(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(Uuid),

    #[error("Sampling session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Survey station not found: {0}")]
    StationNotFound(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        !matches!(self, StorageError::Database(_))
    }
}
