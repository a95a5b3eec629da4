use redb::TableDefinition;

/// Table for storing checkpoints.
/// Key: checkpoint UUID as bytes
/// Value: serialized Checkpoint as bytes
pub const CHECKPOINTS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("checkpoints");

/// Table for storing sampling sessions, readings embedded.
/// Key: session UUID as bytes
/// Value: serialized SamplingSession as bytes
pub const SESSIONS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("sessions");

/// Table for storing survey stations.
/// Key: station id as UTF-8 bytes, so iteration is ordered by id
/// Value: serialized SurveyStation as bytes
pub const STATIONS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("stations");

/// Table for the outbound queue.
/// Key: sequence number, so key order is FIFO order
/// Value: serialized QueuedItem as bytes
pub const QUEUE_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("outbound_queue");

/// Table for the queue's sequence counter. Purging never touches it.
/// Key: counter name
/// Value: last assigned sequence number
pub const QUEUE_SEQUENCE_TABLE: TableDefinition<&str, u64> =
    TableDefinition::new("queue_sequence");

/// Counter key for the outbound queue.
pub const OUTBOUND_SEQUENCE_KEY: &str = "outbound";
