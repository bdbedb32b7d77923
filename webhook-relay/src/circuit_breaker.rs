//! Circuit breaker guarding the downstream processor

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Closed (normal operation)
    Closed,
    /// Open (rejecting requests)
    Open,
    /// Half-open (testing)
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Failure threshold (open after N consecutive failures)
    pub failure_threshold: u32,
    /// Timeout (seconds before half-open)
    pub timeout_seconds: u64,
    /// Success threshold (close after N successes in half-open)
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: crate::DEFAULT_CB_FAILURE_THRESHOLD,
            timeout_seconds: crate::DEFAULT_CB_TIMEOUT_SECONDS,
            success_threshold: 2,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_at: Option<DateTime<Utc>>,
    last_state_change: DateTime<Utc>,
}

/// Circuit breaker over a single downstream target
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    inner: Arc<RwLock<Inner>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    /// Create new circuit breaker
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_at: None,
                last_state_change: Utc::now(),
            })),
            config,
        }
    }

    /// Check if a request is allowed; an expired open circuit half-opens
    pub async fn allow_request(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                if let Some(last_failure) = inner.last_failure_at {
                    let elapsed = Utc::now()
                        .signed_duration_since(last_failure)
                        .num_seconds()
                        .max(0) as u64;

                    if elapsed >= self.config.timeout_seconds {
                        info!("Circuit breaker half-opening");
                        inner.state = CircuitState::HalfOpen;
                        inner.success_count = 0;
                        inner.last_state_change = Utc::now();
                        Ok(())
                    } else {
                        Err(Error::CircuitBreakerOpen {
                            reason: format!(
                                "retry in {}s",
                                self.config.timeout_seconds - elapsed
                            ),
                        })
                    }
                } else {
                    Err(Error::CircuitBreakerOpen {
                        reason: "circuit open".to_string(),
                    })
                }
            }
        }
    }

    /// Record a successful call
    pub async fn record_success(&self) {
        let mut inner = self.inner.write().await;
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    info!("Circuit breaker closing");
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.last_state_change = Utc::now();
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed call
    pub async fn record_failure(&self) {
        let mut inner = self.inner.write().await;
        inner.failure_count += 1;
        inner.last_failure_at = Some(Utc::now());

        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    warn!(
                        failures = inner.failure_count,
                        "Circuit breaker opening"
                    );
                    inner.state = CircuitState::Open;
                    inner.last_state_change = Utc::now();
                }
            }
            CircuitState::HalfOpen => {
                warn!("Circuit breaker re-opening");
                inner.state = CircuitState::Open;
                inner.success_count = 0;
                inner.last_state_change = Utc::now();
            }
            CircuitState::Open => {}
        }
    }

    /// Get current state
    pub async fn state(&self) -> CircuitState {
        self.inner.read().await.state
    }

    /// Reset circuit breaker (manual intervention)
    pub async fn reset(&self) {
        info!("Manually resetting circuit breaker");
        let mut inner = self.inner.write().await;
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.last_failure_at = None;
        inner.last_state_change = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure_threshold: u32, timeout_seconds: u64) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold,
            timeout_seconds,
            success_threshold: 2,
        })
    }

    #[tokio::test]
    async fn test_opens_after_threshold() {
        let cb = breaker(3, 60);

        assert_eq!(cb.state().await, CircuitState::Closed);
        assert!(cb.allow_request().await.is_ok());

        cb.record_failure().await;
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Closed);

        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(matches!(
            cb.allow_request().await,
            Err(Error::CircuitBreakerOpen { .. })
        ));
    }

    #[tokio::test]
    async fn test_success_resets_failure_streak() {
        let cb = breaker(3, 60);

        cb.record_failure().await;
        cb.record_failure().await;
        cb.record_success().await;
        cb.record_failure().await;
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_after_timeout_then_closes() {
        let cb = breaker(1, 0);

        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);

        // zero timeout: next check half-opens immediately
        assert!(cb.allow_request().await.is_ok());
        assert_eq!(cb.state().await, CircuitState::HalfOpen);

        cb.record_success().await;
        cb.record_success().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let cb = breaker(1, 0);

        cb.record_failure().await;
        assert!(cb.allow_request().await.is_ok());
        assert_eq!(cb.state().await, CircuitState::HalfOpen);

        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_manual_reset() {
        let cb = breaker(1, 600);

        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);

        cb.reset().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert!(cb.allow_request().await.is_ok());
    }
}
