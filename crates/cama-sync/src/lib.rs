//! CAMA Sync - Outbound delivery and restart recovery.

pub mod engine;
pub mod protocol;
pub mod recovery;
pub mod sink;

pub use engine::{SyncEngine, SyncError, SyncPolicy, SyncResult};
pub use protocol::Batch;
pub use recovery::{RecoveryHelper, RecoveryReport};
pub use sink::{FileSink, Sink, SinkError};

#[cfg(any(test, feature = "test-utils"))]
pub use sink::MemorySink;
