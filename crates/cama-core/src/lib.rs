//! CAMA Core - Domain models, traits, and validation.
//!
//! This crate holds the offline-first domain: checkpoints, sampling
//! sessions, survey stations and the outbound change queue, plus the storage
//! traits the other CAMA crates implement. It has no dependencies on other
//! CAMA crates.

pub mod checkpoint;
pub mod clock;
pub mod error;
pub mod meter;
pub mod queue;
pub mod session;
pub mod station;
pub mod storage;
pub mod validation;

// Re-exports for convenience
pub use checkpoint::{
    Checkpoint, CheckpointDto, CheckpointFilter, CheckpointPatch, NewCheckpoint, PassageType,
};
pub use clock::MonotonicClock;
pub use error::{CoreError, MeterError, SessionError, StorageError, ValidationError};
pub use meter::{MeterSource, SimulatedMeter};
pub use queue::{Change, DeletedRef, QueueItemKind, QueuedItem, Recorded};
pub use session::{GasReading, SamplingSession, SessionDto};
pub use station::SurveyStation;
pub use storage::{EntityStore, OutboundQueue, StationDirectory};
pub use validation::Validator;

#[cfg(any(test, feature = "test-utils"))]
pub use meter::ScriptedMeter;
#[cfg(any(test, feature = "test-utils"))]
pub use storage::memory::{InMemoryEntityStore, InMemoryOutboundQueue};
