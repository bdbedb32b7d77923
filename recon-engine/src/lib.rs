//! # PayRail Reconciliation Engine
//!
//! Compares the internal payment ledger against the external processor's
//! transaction log and explains every difference:
//! - Idempotent payment-log ingestion
//! - Five-step session pipeline with persisted progress
//! - Data integrity validation (eight parallel checks)
//! - Statistical anomaly detection over both ledgers
//! - Hash-indexed record comparison with normalized statuses
//! - Rule-driven discrepancy auto-resolution
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │        Reconciliation Orchestrator               │
//! └──────┬──────────┬──────────┬──────────┬──────────┘
//!        │          │          │          │
//! ┌──────▼───┐ ┌────▼─────┐ ┌──▼───────┐ ┌▼─────────┐
//! │Integrity │ │ Anomaly  │ │ Record   │ │Resolver  │
//! │Validator │ │ Detector │ │Comparator│ │          │
//! └──────┬───┘ └────┬─────┘ └──┬───────┘ └┬─────────┘
//!        │          │          │          │
//! ┌──────▼──────────▼──────────▼──────────▼──────────┐
//! │     Ledger Stores + Processor Client             │
//! └──────────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod anomaly;
pub mod comparator;
pub mod error;
pub mod ingest;
pub mod integrity;
pub mod memory;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod processor;
pub mod resolver;
pub mod store;

pub use error::{Error, Result};
pub use models::*;
pub use orchestrator::{
    ConfigValidation, ReconciliationOrchestrator, ReconciliationOutcome, ReconciliationParams,
    ReconciliationPlan,
};

/// Pipeline steps, in execution order
pub const RECONCILIATION_STEPS: [&str; 5] = [
    "data-integrity-validation",
    "fetch-internal-records",
    "fetch-external-records",
    "anomaly-detection",
    "reconciliation-comparison",
];

/// Default page size for external processor fetches
pub const DEFAULT_FETCH_PAGE_SIZE: usize = 100;

/// Default inter-page delay (milliseconds) for rate limiting
pub const DEFAULT_FETCH_PAGE_DELAY_MS: u64 = 200;
