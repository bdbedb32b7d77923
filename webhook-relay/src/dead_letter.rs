//! Dead letter store
//!
//! Bounded, age-ordered store of callbacks that exhausted their retries.
//! The in-memory collection is authoritative; the optional durable sink is
//! best-effort and never blocks admission.

use crate::metrics::DEAD_LETTER_SIZE;
use crate::types::DeadLetterItem;
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Durable backing write for dead letters, used for audit
#[async_trait]
pub trait DurableSink: Send + Sync {
    async fn persist(&self, item: &DeadLetterItem) -> Result<()>;
}

/// Bounded FIFO dead-letter store; oldest item is evicted when full
pub struct DeadLetterStore {
    items: RwLock<VecDeque<DeadLetterItem>>,
    max_size: usize,
    sink: Option<Arc<dyn DurableSink>>,
}

impl DeadLetterStore {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: RwLock::new(VecDeque::new()),
            max_size,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn DurableSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Admit an item, evicting the oldest when at capacity. A durable-write
    /// failure is logged and swallowed; admission always succeeds.
    pub async fn push(&self, item: DeadLetterItem) {
        {
            let mut items = self.items.write().await;
            if items.len() >= self.max_size {
                if let Some(evicted) = items.pop_front() {
                    warn!(
                        event_id = %evicted.event_id,
                        "dead letter store full, evicting oldest item"
                    );
                }
            }
            items.push_back(item.clone());
            DEAD_LETTER_SIZE.set(items.len() as i64);
        }

        info!(event_id = %item.event_id, attempts = item.total_attempts, "event dead-lettered");

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.persist(&item).await {
                error!(
                    event_id = %item.event_id,
                    error = %e,
                    "failed to durably persist dead letter"
                );
            }
        }
    }

    pub async fn find(&self, event_id: &str) -> Option<DeadLetterItem> {
        let items = self.items.read().await;
        items.iter().find(|i| i.event_id == event_id).cloned()
    }

    /// Remove and return the item for the event, if present
    pub async fn remove(&self, event_id: &str) -> Option<DeadLetterItem> {
        let mut items = self.items.write().await;
        let pos = items.iter().position(|i| i.event_id == event_id)?;
        let removed = items.remove(pos);
        DEAD_LETTER_SIZE.set(items.len() as i64);
        removed
    }

    /// Replace the stored item for the same event id, keeping queue order
    pub async fn update_in_place(&self, item: DeadLetterItem) {
        let mut items = self.items.write().await;
        if let Some(existing) = items.iter_mut().find(|i| i.event_id == item.event_id) {
            *existing = item;
        }
    }

    /// Snapshot of all items, oldest first
    pub async fn all(&self) -> Vec<DeadLetterItem> {
        let items = self.items.read().await;
        items.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    pub async fn clear(&self) {
        let mut items = self.items.write().await;
        items.clear();
        DEAD_LETTER_SIZE.set(0);
        info!("dead letter store cleared");
    }
}
