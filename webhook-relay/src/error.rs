//! Webhook relay errors

use thiserror::Error;

/// Webhook relay error type
#[derive(Error, Debug)]
pub enum Error {
    /// Circuit breaker is rejecting requests
    #[error("Circuit breaker open: {reason}")]
    CircuitBreakerOpen {
        /// Why the request was rejected
        reason: String,
    },

    /// Processing attempt exceeded its timeout
    #[error("Processing timed out after {seconds}s")]
    Timeout {
        /// Configured timeout
        seconds: u64,
    },

    /// The downstream processor rejected the payload
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    /// Another attempt for the same idempotency key is in flight
    #[error("Operation already in flight for key {0}")]
    DuplicateInFlight(String),

    /// Retry queue is paused
    #[error("Retry queue is paused")]
    QueuePaused,

    /// No dead letter exists for the event
    #[error("No dead letter for event {0}")]
    DeadLetterNotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Webhook relay result type
pub type Result<T> = std::result::Result<T, Error>;
