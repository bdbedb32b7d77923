//! End-to-end webhook relay flow: engine loop, breaker, dead letters

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use webhook_relay::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use webhook_relay::dead_letter::{DeadLetterStore, DurableSink};
use webhook_relay::retry::{RetryConfig, WebhookRetryEngine};
use webhook_relay::*;

struct FlakyProcessor {
    fail_first: u32,
    calls: AtomicU32,
}

#[async_trait]
impl WebhookProcessor for FlakyProcessor {
    async fn process(
        &self,
        _event_id: &str,
        _payload: &serde_json::Value,
        _signature: Option<&str>,
    ) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            Err(Error::ProcessingFailed("downstream unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

struct RecordingSink {
    persisted: tokio::sync::Mutex<Vec<String>>,
}

#[async_trait]
impl DurableSink for RecordingSink {
    async fn persist(&self, item: &DeadLetterItem) -> Result<()> {
        self.persisted.lock().await.push(item.event_id.clone());
        Ok(())
    }
}

fn fast_config() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        base_delay_ms: 1,
        max_delay_ms: 10,
        backoff_factor: 2.0,
        processing_timeout_ms: 5_000,
        poll_interval_ms: 5,
        sweep_interval_secs: 3600,
        status_max_age_secs: 3600,
    }
}

#[tokio::test]
async fn test_background_loop_recovers_transient_failure() {
    let processor = Arc::new(FlakyProcessor {
        fail_first: 2,
        calls: AtomicU32::new(0),
    });
    let engine = Arc::new(WebhookRetryEngine::new(processor.clone(), fast_config()));

    let runner = engine.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    let status = engine
        .process_webhook("evt_1", serde_json::json!({"type": "payment.succeeded"}), None)
        .await
        .unwrap();
    assert_eq!(status.state, ProcessingState::Pending);

    // the loop drains the delay queue; third attempt succeeds
    for _ in 0..100 {
        if engine
            .status("evt_1")
            .map(|s| s.state == ProcessingState::Completed)
            .unwrap_or(false)
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    handle.abort();

    let status = engine.status("evt_1").unwrap();
    assert_eq!(status.state, ProcessingState::Completed);
    assert_eq!(status.attempts, 3);
    assert_eq!(processor.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_exhaustion_reaches_durable_sink() {
    let sink = Arc::new(RecordingSink {
        persisted: tokio::sync::Mutex::new(Vec::new()),
    });
    let store = Arc::new(DeadLetterStore::new(100).with_sink(sink.clone()));
    let processor = Arc::new(FlakyProcessor {
        fail_first: u32::MAX,
        calls: AtomicU32::new(0),
    });
    let engine =
        WebhookRetryEngine::new(processor, fast_config()).with_dead_letter_store(store.clone());

    engine
        .process_webhook("evt_dead", serde_json::json!({}), None)
        .await
        .unwrap();
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        engine.process_due_retries().await;
        if !store.is_empty().await {
            break;
        }
    }

    assert_eq!(store.len().await, 1);
    assert_eq!(sink.persisted.lock().await.as_slice(), &["evt_dead".to_string()]);

    let stats = engine.stats().await;
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.delayed, 0);
}

#[tokio::test]
async fn test_open_breaker_consumes_attempts() {
    // breaker opens on the first failure and stays open for a minute,
    // so the two scheduled retries are rejected without downstream calls
    let breaker = CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: 1,
        timeout_seconds: 60,
        success_threshold: 1,
    });
    let processor = Arc::new(FlakyProcessor {
        fail_first: u32::MAX,
        calls: AtomicU32::new(0),
    });
    let engine = WebhookRetryEngine::new(processor.clone(), fast_config()).with_breaker(breaker);

    engine
        .process_webhook("evt_1", serde_json::json!({}), None)
        .await
        .unwrap();
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        engine.process_due_retries().await;
        if engine
            .status("evt_1")
            .map(|s| s.state == ProcessingState::DeadLetter)
            .unwrap_or(false)
        {
            break;
        }
    }

    // only the first attempt reached the processor
    assert_eq!(processor.calls.load(Ordering::SeqCst), 1);
    let status = engine.status("evt_1").unwrap();
    assert_eq!(status.state, ProcessingState::DeadLetter);
    assert!(status.last_error.unwrap().contains("Circuit breaker open"));
}

#[tokio::test]
async fn test_idempotency_guard_wraps_processing() {
    let guard = IdempotencyGuard::new(3600);
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..3 {
        let calls = calls.clone();
        let result: String = guard
            .execute("evt_1", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("processed".to_string())
            })
            .await
            .unwrap();
        assert_eq!(result, "processed");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
