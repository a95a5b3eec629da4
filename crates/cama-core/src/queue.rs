use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checkpoint::CheckpointDto;
use crate::error::StorageError;
use crate::session::SessionDto;

/// What a queued change describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueItemKind {
    CheckpointCreate,
    CheckpointUpdate,
    CheckpointDelete,
    SessionUpload,
}

impl QueueItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueItemKind::CheckpointCreate => "CHECKPOINT_CREATE",
            QueueItemKind::CheckpointUpdate => "CHECKPOINT_UPDATE",
            QueueItemKind::CheckpointDelete => "CHECKPOINT_DELETE",
            QueueItemKind::SessionUpload => "SESSION_UPLOAD",
        }
    }

    pub fn is_checkpoint(&self) -> bool {
        !matches!(self, QueueItemKind::SessionUpload)
    }
}

impl std::fmt::Display for QueueItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entry in the outbound queue. Never mutated after enqueue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedItem {
    /// Position in the queue; strictly increasing, never reused.
    pub sequence: u64,
    pub kind: QueueItemKind,
    /// Snapshot of the entity at enqueue time.
    pub payload: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedItem {
    /// The entity id carried by the payload, if it has one.
    pub fn entity_id(&self) -> Option<Uuid> {
        self.payload
            .get("id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
    }
}

/// Payload of a delete event. Only the id survives the entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletedRef {
    pub id: Uuid,
}

/// A domain change ready to be queued.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    CheckpointCreated(CheckpointDto),
    CheckpointUpdated(CheckpointDto),
    CheckpointDeleted(DeletedRef),
    SessionUploaded(SessionDto),
}

impl Change {
    pub fn kind(&self) -> QueueItemKind {
        match self {
            Change::CheckpointCreated(_) => QueueItemKind::CheckpointCreate,
            Change::CheckpointUpdated(_) => QueueItemKind::CheckpointUpdate,
            Change::CheckpointDeleted(_) => QueueItemKind::CheckpointDelete,
            Change::SessionUploaded(_) => QueueItemKind::SessionUpload,
        }
    }

    /// Serialize the change into an independent JSON snapshot.
    pub fn to_payload(&self) -> Result<serde_json::Value, StorageError> {
        let value = match self {
            Change::CheckpointCreated(dto) | Change::CheckpointUpdated(dto) => {
                serde_json::to_value(dto)
            }
            Change::CheckpointDeleted(r) => serde_json::to_value(r),
            Change::SessionUploaded(dto) => serde_json::to_value(dto),
        };
        value.map_err(|e| StorageError::Database(e.to_string()))
    }
}

/// A store mutation paired with the queue event it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded<T> {
    pub value: T,
    pub event: QueuedItem,
}

impl<T> Recorded<T> {
    pub fn new(value: T, event: QueuedItem) -> Self {
        Self { value, event }
    }
}
