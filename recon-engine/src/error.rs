//! Error types for the reconciliation engine

use thiserror::Error;
use uuid::Uuid;

/// Result type for reconciliation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciliation errors
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed configuration or parameters
    #[error("Validation error: {0}")]
    Validation(String),

    /// Session state machine violation
    #[error("Cannot {action} session in state {from}")]
    InvalidStateTransition {
        /// Current session state
        from: String,
        /// Attempted action
        action: String,
    },

    /// Session not found in the store
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    /// Session was canceled while a run was in flight
    #[error("Session canceled: {0}")]
    SessionCanceled(Uuid),

    /// Payment record not found
    #[error("Payment record not found: {0}")]
    RecordNotFound(String),

    /// Duplicate external event id on insert
    #[error("Duplicate event id: {0}")]
    DuplicateEventId(String),

    /// Ledger store failure
    #[error("Store error: {0}")]
    Store(String),

    /// External processor API failure
    #[error("Processor error: {0}")]
    Processor(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
