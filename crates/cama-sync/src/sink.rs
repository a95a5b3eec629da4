use std::collections::BTreeMap;
use std::future::Future;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use cama_core::QueuedItem;

use crate::protocol::Batch;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SinkError {
    /// The receiver answered and refused the batch.
    #[error("Batch rejected: {0}")]
    Rejected(String),

    /// The receiver could not be reached or did not confirm.
    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

/// Remote receiver of queued changes.
///
/// `deliver` is all-or-nothing: `Ok` means every item in the batch is
/// durably accepted, any error means none of it may be assumed delivered.
pub trait Sink: Send + Sync {
    fn deliver(&self, batch: &Batch) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// Sink that appends each batch as one JSON line to an inbox file.
///
/// A batch is acknowledged only after the line has been fsynced. Partial
/// trailing data left by an interrupted write is truncated before the next
/// line is appended.
pub struct FileSink {
    path: PathBuf,
    // Keeps concurrent deliveries from interleaving lines
    write_lock: Mutex<()>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every item ever delivered, de-duplicated by sequence number and
    /// ordered by it. A line that cannot be parsed (e.g. a torn write at the
    /// end of the file) is skipped.
    pub async fn delivered(&self) -> Result<Vec<QueuedItem>, SinkError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SinkError::Unavailable(e.to_string())),
        };

        let mut by_sequence = BTreeMap::new();
        for (line_no, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Batch>(line) {
                Ok(batch) => {
                    for item in batch.items {
                        by_sequence.entry(item.sequence).or_insert(item);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        line = line_no + 1,
                        error = %e,
                        "skipping unreadable inbox line"
                    );
                }
            }
        }

        Ok(by_sequence.into_values().collect())
    }
}

impl Sink for FileSink {
    async fn deliver(&self, batch: &Batch) -> Result<(), SinkError> {
        let mut line =
            serde_json::to_vec(batch).map_err(|e| SinkError::Rejected(e.to_string()))?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.path)
            .await
            .map_err(unavailable)?;

        let end = repair_tail(&mut file).await.map_err(unavailable)?;
        if end.torn > 0 {
            tracing::warn!(
                path = %self.path.display(),
                bytes = end.torn,
                "truncated partial line left by an interrupted write"
            );
        }

        file.seek(SeekFrom::Start(end.len))
            .await
            .map_err(unavailable)?;
        file.write_all(&line).await.map_err(unavailable)?;
        file.sync_all().await.map_err(unavailable)?;

        tracing::debug!(
            path = %self.path.display(),
            items = batch.len(),
            "batch written to inbox"
        );
        Ok(())
    }
}

fn unavailable(e: std::io::Error) -> SinkError {
    SinkError::Unavailable(e.to_string())
}

struct TailRepair {
    /// Length of the file after repair, ending in a newline or empty.
    len: u64,
    /// Bytes removed from the end.
    torn: u64,
}

/// Truncate anything after the last newline.
async fn repair_tail(file: &mut File) -> std::io::Result<TailRepair> {
    let total = file.metadata().await?.len();
    let mut buf = vec![0u8; 4096];
    let mut end = total;
    let mut keep = 0;

    while end > 0 {
        let start = end.saturating_sub(buf.len() as u64);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start)).await?;
        file.read_exact(chunk).await?;
        if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
            keep = start + pos as u64 + 1;
            break;
        }
        end = start;
    }

    if keep < total {
        file.set_len(keep).await?;
    }
    Ok(TailRepair {
        len: keep,
        torn: total - keep,
    })
}

#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemorySink;

#[cfg(any(test, feature = "test-utils"))]
mod memory {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct SinkState {
        failing: bool,
        attempts: usize,
        accepted: Vec<Batch>,
    }

    /// In-memory sink for testing. Can be switched into a failing mode and
    /// given an artificial delay to exercise timeouts.
    #[derive(Default)]
    pub struct MemorySink {
        state: Mutex<SinkState>,
        delay: Option<Duration>,
    }

    impl MemorySink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_delay(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        pub fn set_failing(&self, failing: bool) {
            self.state.lock().unwrap().failing = failing;
        }

        /// Number of `deliver` calls, successful or not.
        pub fn attempts(&self) -> usize {
            self.state.lock().unwrap().attempts
        }

        pub fn batches(&self) -> Vec<Batch> {
            self.state.lock().unwrap().accepted.clone()
        }

        /// Sequence numbers of every accepted item, in acceptance order.
        pub fn delivered_sequences(&self) -> Vec<u64> {
            self.state
                .lock()
                .unwrap()
                .accepted
                .iter()
                .flat_map(|b| b.sequences())
                .collect()
        }
    }

    impl Sink for MemorySink {
        async fn deliver(&self, batch: &Batch) -> Result<(), SinkError> {
            self.state.lock().unwrap().attempts += 1;

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let mut state = self.state.lock().unwrap();
            if state.failing {
                return Err(SinkError::Unavailable("simulated outage".to_string()));
            }
            state.accepted.push(batch.clone());
            Ok(())
        }
    }
}
