use std::sync::{Arc, Mutex};

use chrono::Utc;
use redb::{Database, ReadableTable, ReadableTableMetadata};

use cama_core::{OutboundQueue, QueueItemKind, QueuedItem, StorageError};

use crate::tables::{OUTBOUND_SEQUENCE_KEY, QUEUE_SEQUENCE_TABLE, QUEUE_TABLE};
use crate::{db_err, decode, encode, lock_writer};

/// redb implementation of OutboundQueue.
///
/// Items live in their own table, keyed by sequence number, apart from the
/// entity tables. The last assigned number is kept in a separate counter
/// table so purging the log never causes a number to be reused.
pub struct RedbOutboundQueue {
    db: Arc<Database>,
    writer: Mutex<()>,
}

impl RedbOutboundQueue {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            writer: Mutex::new(()),
        }
    }

    /// Initialize the database tables.
    pub fn init_tables(db: &Database) -> Result<(), StorageError> {
        let write_txn = db.begin_write().map_err(db_err)?;
        {
            let _ = write_txn.open_table(QUEUE_TABLE).map_err(db_err)?;
            let _ = write_txn.open_table(QUEUE_SEQUENCE_TABLE).map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;
        Ok(())
    }

    /// Highest sequence number ever assigned, 0 if none.
    pub fn last_sequence(&self) -> Result<u64, StorageError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(QUEUE_SEQUENCE_TABLE).map_err(db_err)?;

        let last = table
            .get(OUTBOUND_SEQUENCE_KEY)
            .map_err(db_err)?
            .map(|v| v.value())
            .unwrap_or(0);

        Ok(last)
    }
}

impl OutboundQueue for RedbOutboundQueue {
    fn enqueue(
        &self,
        kind: QueueItemKind,
        payload: serde_json::Value,
    ) -> Result<QueuedItem, StorageError> {
        let _writer = lock_writer(&self.writer)?;

        let write_txn = self.db.begin_write().map_err(db_err)?;

        let item = {
            // Get current sequence and increment atomically
            let mut seq_table = write_txn.open_table(QUEUE_SEQUENCE_TABLE).map_err(db_err)?;

            let current_seq = seq_table
                .get(OUTBOUND_SEQUENCE_KEY)
                .map_err(db_err)?
                .map(|v| v.value())
                .unwrap_or(0);

            let item = QueuedItem {
                sequence: current_seq + 1,
                kind,
                payload,
                enqueued_at: Utc::now(),
            };
            let value = encode(&item)?;

            let mut queue_table = write_txn.open_table(QUEUE_TABLE).map_err(db_err)?;
            queue_table
                .insert(item.sequence, value.as_slice())
                .map_err(db_err)?;

            seq_table
                .insert(OUTBOUND_SEQUENCE_KEY, item.sequence)
                .map_err(db_err)?;

            item
        };

        // Visible to readers only once committed
        write_txn.commit().map_err(db_err)?;

        tracing::debug!(sequence = item.sequence, kind = %item.kind, "enqueued change");
        Ok(item)
    }

    fn take_batch(&self, max_items: usize) -> Result<Vec<QueuedItem>, StorageError> {
        if max_items == 0 {
            return Ok(Vec::new());
        }

        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(QUEUE_TABLE).map_err(db_err)?;

        let mut items = Vec::new();
        for entry in table.iter().map_err(db_err)?.take(max_items) {
            let (_, value) = entry.map_err(db_err)?;
            items.push(decode::<QueuedItem>(value.value())?);
        }

        Ok(items)
    }

    fn purge(&self, sequences: &[u64]) -> Result<usize, StorageError> {
        if sequences.is_empty() {
            return Ok(0);
        }

        let _writer = lock_writer(&self.writer)?;

        let write_txn = self.db.begin_write().map_err(db_err)?;
        let mut removed = 0;
        {
            let mut table = write_txn.open_table(QUEUE_TABLE).map_err(db_err)?;
            for &sequence in sequences {
                if table.remove(sequence).map_err(db_err)?.is_some() {
                    removed += 1;
                }
            }
        }
        write_txn.commit().map_err(db_err)?;

        tracing::debug!(requested = sequences.len(), removed, "purged queue items");
        Ok(removed)
    }

    fn len(&self) -> Result<usize, StorageError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(QUEUE_TABLE).map_err(db_err)?;
        let len = table.len().map_err(db_err)?;
        Ok(len as usize)
    }
}
