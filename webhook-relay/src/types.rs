//! Webhook relay types

use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing state of one inbound event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    /// Waiting for a retry attempt
    Pending,
    /// An attempt is running right now
    Processing,
    /// Processed successfully
    Completed,
    /// Dropped without completing (retry queue cleared); a fresh delivery
    /// starts over
    Failed,
    /// Retries exhausted
    DeadLetter,
}

impl ProcessingState {
    /// Terminal states have no retry scheduled and are eligible for the
    /// status sweep
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessingState::Completed | ProcessingState::Failed | ProcessingState::DeadLetter
        )
    }
}

/// Observable status of one event id in the relay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingStatus {
    /// External event id (idempotency key)
    pub event_id: String,
    /// Current state
    pub state: ProcessingState,
    /// Attempts performed so far
    pub attempts: u32,
    /// First receipt time
    pub received_at: DateTime<Utc>,
    /// Last state change
    pub updated_at: DateTime<Utc>,
    /// Most recent error, if any
    pub last_error: Option<String>,
}

/// One inbound callback awaiting processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookJob {
    /// External event id
    pub event_id: String,
    /// Raw callback payload, preserved verbatim
    pub payload: serde_json::Value,
    /// Delivery signature, if the processor sent one
    pub signature: Option<String>,
    /// Attempts performed so far
    pub attempts: u32,
    /// Original receipt time
    pub received_at: DateTime<Utc>,
    /// Most recent error
    pub last_error: Option<String>,
}

/// Terminal failure record held for manual inspection and replay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterItem {
    /// External event id
    pub event_id: String,
    /// Raw callback payload
    pub payload: serde_json::Value,
    /// Delivery signature
    pub signature: Option<String>,
    /// Total attempts performed before dead-lettering
    pub total_attempts: u32,
    /// First attempt time
    pub first_attempt_at: DateTime<Utc>,
    /// Last attempt time
    pub last_attempt_at: DateTime<Utc>,
    /// Error of the final attempt
    pub final_error: String,
    /// When the item entered the dead-letter store
    pub enqueued_at: DateTime<Utc>,
}

/// Retry queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryQueueStats {
    /// Events pending a retry
    pub waiting: u64,
    /// Attempts running right now
    pub active: u64,
    /// Events processed successfully
    pub completed: u64,
    /// Events dead-lettered
    pub failed: u64,
    /// Jobs sitting in the delay queue
    pub delayed: u64,
}

/// Downstream handler for a callback payload
#[async_trait]
pub trait WebhookProcessor: Send + Sync {
    /// Process one callback. Errors are treated as transient and retried.
    async fn process(
        &self,
        event_id: &str,
        payload: &serde_json::Value,
        signature: Option<&str>,
    ) -> Result<()>;
}
