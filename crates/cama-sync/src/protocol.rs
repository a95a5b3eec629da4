use serde::{Deserialize, Serialize};

use cama_core::QueuedItem;

/// Ordered group of queued items delivered to a sink in one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// Items in ascending sequence order.
    pub items: Vec<QueuedItem>,
}

impl Batch {
    pub fn new(items: Vec<QueuedItem>) -> Self {
        Self { items }
    }

    pub fn empty() -> Self {
        Self { items: Vec::new() }
    }

    /// Sequence numbers carried by this batch, in delivery order.
    pub fn sequences(&self) -> Vec<u64> {
        self.items.iter().map(|i| i.sequence).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
