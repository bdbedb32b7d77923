//! # PayRail Webhook Relay
//!
//! At-least-once processing of processor callbacks:
//! - Synchronous first attempt with a hard timeout
//! - Exponential-backoff retries via a delay queue
//! - Circuit breaker around the downstream processor
//! - Bounded dead-letter store with manual replay
//! - Idempotency guard keyed by event id
//!
//! ## Architecture
//!
//! ```text
//! inbound callback
//!        │
//! ┌──────▼──────────────┐   failure   ┌──────────────┐
//! │  Retry Engine       ├────────────►│ Delay Queue  │
//! │  (timeout + breaker)│◄────────────┤ (backoff)    │
//! └──────┬──────────────┘  due retry  └──────────────┘
//!        │ exhausted
//! ┌──────▼──────────────┐
//! │  Dead Letter Store  │──► durable sink (best-effort)
//! └─────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod circuit_breaker;
pub mod dead_letter;
pub mod error;
pub mod idempotency;
pub mod metrics;
pub mod retry;
pub mod types;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use dead_letter::{DeadLetterStore, DurableSink};
pub use error::{Error, Result};
pub use idempotency::IdempotencyGuard;
pub use retry::{retry_delay, RetryConfig, WebhookRetryEngine};
pub use types::*;

/// Default total attempts before dead-lettering
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base backoff delay (milliseconds)
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;

/// Default backoff cap (milliseconds)
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;

/// Default backoff multiplier
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Default per-attempt processing timeout (milliseconds)
pub const DEFAULT_PROCESSING_TIMEOUT_MS: u64 = 30_000;

/// Default dead letter store capacity
pub const DEFAULT_DEAD_LETTER_CAPACITY: usize = 1_000;

/// Default circuit breaker threshold (failures before opening)
pub const DEFAULT_CB_FAILURE_THRESHOLD: u32 = 5;

/// Default circuit breaker timeout (seconds before half-open)
pub const DEFAULT_CB_TIMEOUT_SECONDS: u64 = 60;
