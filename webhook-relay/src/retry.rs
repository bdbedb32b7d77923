//! Webhook retry engine
//!
//! Attempts inbound callbacks synchronously, then drives failed ones
//! through exponential-backoff retries via a delay queue. The queue holds
//! at most one entry per event id, so retries for the same event are
//! strictly ordered by attempt number.

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::dead_letter::DeadLetterStore;
use crate::metrics::{DELAY_QUEUE_SIZE, WEBHOOK_ATTEMPTS_TOTAL};
use crate::types::*;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Retry engine configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts before dead-lettering (first synchronous attempt included)
    pub max_attempts: u32,
    /// Base backoff delay (milliseconds)
    pub base_delay_ms: u64,
    /// Backoff cap (milliseconds)
    pub max_delay_ms: u64,
    /// Backoff multiplier
    pub backoff_factor: f64,
    /// Hard timeout per processing attempt (milliseconds)
    pub processing_timeout_ms: u64,
    /// Delay-queue poll interval (milliseconds)
    pub poll_interval_ms: u64,
    /// Status sweep interval (seconds)
    pub sweep_interval_secs: u64,
    /// Terminal statuses older than this are swept (seconds)
    pub status_max_age_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: crate::DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: crate::DEFAULT_BASE_DELAY_MS,
            max_delay_ms: crate::DEFAULT_MAX_DELAY_MS,
            backoff_factor: crate::DEFAULT_BACKOFF_FACTOR,
            processing_timeout_ms: crate::DEFAULT_PROCESSING_TIMEOUT_MS,
            poll_interval_ms: 100,
            sweep_interval_secs: 60,
            status_max_age_secs: 3600,
        }
    }
}

/// Backoff delay before retry number `attempt` (attempts start at 1).
/// Non-decreasing in `attempt`, capped at `max_delay_ms`.
pub fn retry_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let raw = config.base_delay_ms as f64 * config.backoff_factor.powi(attempt as i32);
    Duration::from_millis(raw.min(config.max_delay_ms as f64) as u64)
}

struct ScheduledRetry {
    due_at: DateTime<Utc>,
    job: WebhookJob,
}

impl PartialEq for ScheduledRetry {
    fn eq(&self, other: &Self) -> bool {
        self.due_at == other.due_at
    }
}

impl Eq for ScheduledRetry {}

impl PartialOrd for ScheduledRetry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledRetry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.due_at.cmp(&other.due_at)
    }
}

/// Accepts inbound callbacks and guarantees eventual processing or
/// dead-lettering
pub struct WebhookRetryEngine {
    processor: Arc<dyn WebhookProcessor>,
    breaker: CircuitBreaker,
    statuses: DashMap<String, ProcessingStatus>,
    dead_letters: Arc<DeadLetterStore>,
    delayed: Mutex<BinaryHeap<Reverse<ScheduledRetry>>>,
    paused: AtomicBool,
    completed: AtomicU64,
    failed: AtomicU64,
    config: RetryConfig,
}

impl WebhookRetryEngine {
    pub fn new(processor: Arc<dyn WebhookProcessor>, config: RetryConfig) -> Self {
        Self {
            processor,
            breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
            statuses: DashMap::new(),
            dead_letters: Arc::new(DeadLetterStore::new(crate::DEFAULT_DEAD_LETTER_CAPACITY)),
            delayed: Mutex::new(BinaryHeap::new()),
            paused: AtomicBool::new(false),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            config,
        }
    }

    pub fn with_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_dead_letter_store(mut self, store: Arc<DeadLetterStore>) -> Self {
        self.dead_letters = store;
        self
    }

    /// Accept an inbound callback: attempt it synchronously and schedule a
    /// backoff retry on failure. A re-delivered event id returns its
    /// current status without reprocessing, except a cleared (failed) one,
    /// which has no retry scheduled and starts over.
    pub async fn process_webhook(
        &self,
        event_id: &str,
        payload: serde_json::Value,
        signature: Option<String>,
    ) -> Result<ProcessingStatus> {
        match self.statuses.get(event_id).map(|s| s.value().clone()) {
            Some(existing) if existing.state != ProcessingState::Failed => {
                info!(event_id, state = ?existing.state, "duplicate delivery, returning current status");
                return Ok(existing);
            }
            _ => {}
        }

        let mut job = WebhookJob {
            event_id: event_id.to_string(),
            payload,
            signature,
            attempts: 0,
            received_at: Utc::now(),
            last_error: None,
        };
        self.set_status(&job, ProcessingState::Processing);

        match self.attempt(&mut job).await {
            Ok(()) => self.mark_completed(&job),
            Err(e) => self.handle_failure(job.clone(), e).await,
        }

        self.status(event_id)
            .ok_or_else(|| Error::Internal(format!("status lost for event {}", event_id)))
    }

    /// Current status for an event id, if tracked
    pub fn status(&self, event_id: &str) -> Option<ProcessingStatus> {
        self.statuses.get(event_id).map(|s| s.value().clone())
    }

    /// Snapshot of the dead letter store, oldest first
    pub async fn dead_letter_items(&self) -> Vec<DeadLetterItem> {
        self.dead_letters.all().await
    }

    /// Manually retry a dead-lettered event. Success removes it from the
    /// dead-letter set; failure updates it in place and returns false.
    pub async fn retry_dead_letter(&self, event_id: &str) -> Result<bool> {
        if self.paused.load(Ordering::SeqCst) {
            return Err(Error::QueuePaused);
        }

        let item = self
            .dead_letters
            .find(event_id)
            .await
            .ok_or_else(|| Error::DeadLetterNotFound(event_id.to_string()))?;

        let mut job = WebhookJob {
            event_id: item.event_id.clone(),
            payload: item.payload.clone(),
            signature: item.signature.clone(),
            attempts: item.total_attempts,
            received_at: item.first_attempt_at,
            last_error: Some(item.final_error.clone()),
        };

        match self.attempt(&mut job).await {
            Ok(()) => {
                self.dead_letters.remove(event_id).await;
                self.mark_completed(&job);
                Ok(true)
            }
            Err(e) => {
                let mut updated = item;
                updated.total_attempts = job.attempts;
                updated.last_attempt_at = Utc::now();
                updated.final_error = e.to_string();
                self.dead_letters.update_in_place(updated).await;

                job.last_error = Some(e.to_string());
                self.set_status(&job, ProcessingState::DeadLetter);
                warn!(event_id, error = %e, "manual dead letter retry failed");
                Ok(false)
            }
        }
    }

    /// Run every due retry. Returns the number of jobs attempted; a paused
    /// queue attempts nothing.
    pub async fn process_due_retries(&self) -> usize {
        if self.paused.load(Ordering::SeqCst) {
            return 0;
        }

        let mut attempted = 0;
        loop {
            let next = {
                let mut heap = self.delayed.lock().await;
                match heap.peek() {
                    Some(Reverse(scheduled)) if scheduled.due_at <= Utc::now() => {
                        let job = heap.pop().map(|Reverse(s)| s.job);
                        DELAY_QUEUE_SIZE.set(heap.len() as i64);
                        job
                    }
                    _ => None,
                }
            };
            let Some(mut job) = next else { break };

            self.set_status(&job, ProcessingState::Processing);
            match self.attempt(&mut job).await {
                Ok(()) => self.mark_completed(&job),
                Err(e) => self.handle_failure(job, e).await,
            }
            attempted += 1;
        }
        attempted
    }

    /// Drop terminal statuses older than the configured max age. Pending
    /// and processing entries are never swept regardless of age.
    pub fn sweep_statuses(&self) -> usize {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.config.status_max_age_secs as i64);
        let before = self.statuses.len();
        self.statuses
            .retain(|_, s| !(s.state.is_terminal() && s.updated_at < cutoff));
        let swept = before - self.statuses.len();
        if swept > 0 {
            info!(swept, "swept terminal webhook statuses");
        }
        swept
    }

    /// Queue counters
    pub async fn stats(&self) -> RetryQueueStats {
        let delayed = self.delayed.lock().await.len() as u64;
        let mut waiting = 0u64;
        let mut active = 0u64;
        for entry in self.statuses.iter() {
            match entry.state {
                ProcessingState::Pending => waiting += 1,
                ProcessingState::Processing => active += 1,
                _ => {}
            }
        }
        RetryQueueStats {
            waiting,
            active,
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            delayed,
        }
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        info!("retry queue paused");
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        info!("retry queue resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Drop every delayed job, marking its status failed
    pub async fn clear_retry_queue(&self) -> usize {
        let mut heap = self.delayed.lock().await;
        let cleared = heap.len();
        for Reverse(scheduled) in heap.drain() {
            let mut job = scheduled.job;
            job.last_error = Some("retry queue cleared".to_string());
            self.set_status(&job, ProcessingState::Failed);
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        DELAY_QUEUE_SIZE.set(0);
        warn!(cleared, "retry queue cleared");
        cleared
    }

    /// Drive the delay queue and the status sweep until the task is dropped
    pub async fn run(self: Arc<Self>) {
        info!("webhook retry engine started");
        let mut poll = tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms));
        let mut sweep = tokio::time::interval(Duration::from_secs(self.config.sweep_interval_secs));

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    self.process_due_retries().await;
                }
                _ = sweep.tick() => {
                    self.sweep_statuses();
                }
            }
        }
    }

    /// One processing attempt through the breaker, raced against the
    /// per-attempt timeout. Increments the job's attempt counter.
    async fn attempt(&self, job: &mut WebhookJob) -> Result<()> {
        job.attempts += 1;

        if let Err(e) = self.breaker.allow_request().await {
            WEBHOOK_ATTEMPTS_TOTAL.with_label_values(&["rejected"]).inc();
            return Err(e);
        }

        let timeout = Duration::from_millis(self.config.processing_timeout_ms);
        let result = match tokio::time::timeout(
            timeout,
            self.processor
                .process(&job.event_id, &job.payload, job.signature.as_deref()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                seconds: timeout.as_secs(),
            }),
        };

        match result {
            Ok(()) => {
                self.breaker.record_success().await;
                WEBHOOK_ATTEMPTS_TOTAL.with_label_values(&["success"]).inc();
                Ok(())
            }
            Err(e) => {
                self.breaker.record_failure().await;
                WEBHOOK_ATTEMPTS_TOTAL.with_label_values(&["failure"]).inc();
                Err(e)
            }
        }
    }

    /// Dead-letter an exhausted job or schedule the next backoff retry
    async fn handle_failure(&self, mut job: WebhookJob, error: Error) {
        job.last_error = Some(error.to_string());

        if job.attempts >= self.config.max_attempts {
            let item = DeadLetterItem {
                event_id: job.event_id.clone(),
                payload: job.payload.clone(),
                signature: job.signature.clone(),
                total_attempts: job.attempts,
                first_attempt_at: job.received_at,
                last_attempt_at: Utc::now(),
                final_error: error.to_string(),
                enqueued_at: Utc::now(),
            };
            self.dead_letters.push(item).await;
            self.failed.fetch_add(1, Ordering::SeqCst);
            self.set_status(&job, ProcessingState::DeadLetter);
            return;
        }

        let delay = retry_delay(&self.config, job.attempts);
        let due_at = Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64);
        info!(
            event_id = %job.event_id,
            attempt = job.attempts,
            delay_ms = delay.as_millis() as u64,
            "scheduling webhook retry"
        );
        self.set_status(&job, ProcessingState::Pending);

        let mut heap = self.delayed.lock().await;
        heap.push(Reverse(ScheduledRetry { due_at, job }));
        DELAY_QUEUE_SIZE.set(heap.len() as i64);
    }

    fn mark_completed(&self, job: &WebhookJob) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.set_status(job, ProcessingState::Completed);
        info!(event_id = %job.event_id, attempts = job.attempts, "webhook processed");
    }

    fn set_status(&self, job: &WebhookJob, state: ProcessingState) {
        let now = Utc::now();
        self.statuses
            .entry(job.event_id.clone())
            .and_modify(|s| {
                s.state = state;
                s.attempts = job.attempts;
                s.updated_at = now;
                s.last_error = job.last_error.clone();
            })
            .or_insert_with(|| ProcessingStatus {
                event_id: job.event_id.clone(),
                state,
                attempts: job.attempts,
                received_at: job.received_at,
                updated_at: now,
                last_error: job.last_error.clone(),
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    /// Fails the first `fail_first` attempts, then succeeds
    struct FlakyProcessor {
        fail_first: u32,
        calls: AtomicU32,
    }

    impl FlakyProcessor {
        fn failing() -> Self {
            Self {
                fail_first: u32::MAX,
                calls: AtomicU32::new(0),
            }
        }

        fn succeeding_after(fail_first: u32) -> Self {
            Self {
                fail_first,
                calls: AtomicU32::new(0),
            }
        }
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

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 10,
            backoff_factor: 2.0,
            processing_timeout_ms: 5_000,
            poll_interval_ms: 5,
            sweep_interval_secs: 60,
            status_max_age_secs: 3600,
        }
    }

    async fn drain_until_settled(engine: &WebhookRetryEngine) {
        // delays are single-digit milliseconds under fast_config
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            engine.process_due_retries().await;
            if engine.delayed.lock().await.is_empty() {
                return;
            }
        }
    }

    #[test]
    fn test_retry_delay_monotone_and_capped() {
        let config = RetryConfig {
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            backoff_factor: 2.0,
            ..RetryConfig::default()
        };

        assert_eq!(retry_delay(&config, 1), Duration::from_millis(2000));
        assert_eq!(retry_delay(&config, 2), Duration::from_millis(4000));
        assert_eq!(retry_delay(&config, 3), Duration::from_millis(8000));

        let mut prev = Duration::ZERO;
        for attempt in 1..=20 {
            let d = retry_delay(&config, attempt);
            assert!(d >= prev);
            assert!(d <= Duration::from_millis(60_000));
            prev = d;
        }
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let processor = Arc::new(FlakyProcessor::succeeding_after(0));
        let engine = WebhookRetryEngine::new(processor.clone(), fast_config());

        let status = engine
            .process_webhook("evt_1", serde_json::json!({"n": 1}), None)
            .await
            .unwrap();
        assert_eq!(status.state, ProcessingState::Completed);
        assert_eq!(status.attempts, 1);

        // duplicate delivery short-circuits
        let again = engine
            .process_webhook("evt_1", serde_json::json!({"n": 1}), None)
            .await
            .unwrap();
        assert_eq!(again.state, ProcessingState::Completed);
        assert_eq!(processor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_recovers_on_retry() {
        let processor = Arc::new(FlakyProcessor::succeeding_after(1));
        let engine = WebhookRetryEngine::new(processor, fast_config());

        let status = engine
            .process_webhook("evt_1", serde_json::json!({}), None)
            .await
            .unwrap();
        assert_eq!(status.state, ProcessingState::Pending);

        drain_until_settled(&engine).await;
        let status = engine.status("evt_1").unwrap();
        assert_eq!(status.state, ProcessingState::Completed);
        assert_eq!(status.attempts, 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_dead_letter_after_third_failure() {
        let processor = Arc::new(FlakyProcessor::failing());
        let engine = WebhookRetryEngine::new(processor.clone(), fast_config());

        engine
            .process_webhook("evt_1", serde_json::json!({}), Some("sig".to_string()))
            .await
            .unwrap();
        drain_until_settled(&engine).await;

        // exactly 3 attempts, no fourth scheduled
        assert_eq!(processor.calls.load(Ordering::SeqCst), 3);
        assert!(engine.delayed.lock().await.is_empty());

        let status = engine.status("evt_1").unwrap();
        assert_eq!(status.state, ProcessingState::DeadLetter);
        assert_eq!(status.attempts, 3);

        let items = engine.dead_letter_items().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].event_id, "evt_1");
        assert_eq!(items[0].total_attempts, 3);
        assert_eq!(items[0].signature.as_deref(), Some("sig"));
    }

    #[tokio::test]
    async fn test_manual_dead_letter_retry() {
        let processor = Arc::new(FlakyProcessor::succeeding_after(3));
        let engine = WebhookRetryEngine::new(processor, fast_config());

        engine
            .process_webhook("evt_1", serde_json::json!({}), None)
            .await
            .unwrap();
        drain_until_settled(&engine).await;
        assert_eq!(engine.dead_letter_items().await.len(), 1);

        // fourth call succeeds, removing the dead letter
        let recovered = engine.retry_dead_letter("evt_1").await.unwrap();
        assert!(recovered);
        assert!(engine.dead_letter_items().await.is_empty());
        assert_eq!(
            engine.status("evt_1").unwrap().state,
            ProcessingState::Completed
        );

        assert!(matches!(
            engine.retry_dead_letter("evt_1").await,
            Err(Error::DeadLetterNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_manual_retry_failure_updates_in_place() {
        let processor = Arc::new(FlakyProcessor::failing());
        let engine = WebhookRetryEngine::new(processor, fast_config());

        engine
            .process_webhook("evt_1", serde_json::json!({}), None)
            .await
            .unwrap();
        drain_until_settled(&engine).await;

        let recovered = engine.retry_dead_letter("evt_1").await.unwrap();
        assert!(!recovered);

        let items = engine.dead_letter_items().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].total_attempts, 4);
    }

    #[tokio::test]
    async fn test_pause_holds_retries() {
        let processor = Arc::new(FlakyProcessor::succeeding_after(1));
        let engine = WebhookRetryEngine::new(processor, fast_config());

        engine
            .process_webhook("evt_1", serde_json::json!({}), None)
            .await
            .unwrap();

        engine.pause();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(engine.process_due_retries().await, 0);
        assert!(matches!(
            engine.retry_dead_letter("evt_x").await,
            Err(Error::QueuePaused)
        ));

        engine.resume();
        drain_until_settled(&engine).await;
        assert_eq!(
            engine.status("evt_1").unwrap().state,
            ProcessingState::Completed
        );
    }

    #[tokio::test]
    async fn test_clear_retry_queue() {
        let processor = Arc::new(FlakyProcessor::failing());
        let engine = WebhookRetryEngine::new(processor, fast_config());

        engine
            .process_webhook("evt_1", serde_json::json!({}), None)
            .await
            .unwrap();
        engine
            .process_webhook("evt_2", serde_json::json!({}), None)
            .await
            .unwrap();

        assert_eq!(engine.clear_retry_queue().await, 2);
        assert!(engine.delayed.lock().await.is_empty());
        assert_eq!(engine.status("evt_1").unwrap().state, ProcessingState::Failed);
        assert_eq!(engine.stats().await.failed, 2);
    }

    #[tokio::test]
    async fn test_cleared_event_reprocessed_on_redelivery() {
        let processor = Arc::new(FlakyProcessor::succeeding_after(1));
        let engine = WebhookRetryEngine::new(processor.clone(), fast_config());

        engine
            .process_webhook("evt_1", serde_json::json!({}), None)
            .await
            .unwrap();
        assert_eq!(engine.clear_retry_queue().await, 1);
        assert_eq!(engine.status("evt_1").unwrap().state, ProcessingState::Failed);

        // no retry is scheduled for a cleared event, so a fresh delivery
        // starts over instead of returning the stale status
        let status = engine
            .process_webhook("evt_1", serde_json::json!({}), None)
            .await
            .unwrap();
        assert_eq!(status.state, ProcessingState::Completed);
        assert_eq!(status.attempts, 1);
        assert_eq!(processor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cleared_statuses_are_swept() {
        let processor = Arc::new(FlakyProcessor::failing());
        let mut config = fast_config();
        config.status_max_age_secs = 0;
        let engine = WebhookRetryEngine::new(processor, config);

        engine
            .process_webhook("evt_1", serde_json::json!({}), None)
            .await
            .unwrap();
        engine.clear_retry_queue().await;

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(engine.sweep_statuses(), 1);
        assert!(engine.status("evt_1").is_none());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_old_terminal_statuses() {
        let processor = Arc::new(FlakyProcessor::succeeding_after(0));
        let mut config = fast_config();
        config.status_max_age_secs = 0;
        let engine = WebhookRetryEngine::new(processor, config);

        engine
            .process_webhook("evt_done", serde_json::json!({}), None)
            .await
            .unwrap();

        // a pending entry, regardless of age, survives the sweep
        let pending = WebhookJob {
            event_id: "evt_pending".to_string(),
            payload: serde_json::json!({}),
            signature: None,
            attempts: 1,
            received_at: Utc::now() - chrono::Duration::hours(5),
            last_error: None,
        };
        engine.set_status(&pending, ProcessingState::Pending);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(engine.sweep_statuses(), 1);
        assert!(engine.status("evt_done").is_none());
        assert!(engine.status("evt_pending").is_some());
    }

    #[tokio::test]
    async fn test_stats_counters() {
        let processor = Arc::new(FlakyProcessor::succeeding_after(1));
        let engine = WebhookRetryEngine::new(processor, fast_config());

        engine
            .process_webhook("evt_1", serde_json::json!({}), None)
            .await
            .unwrap();
        let stats = engine.stats().await;
        assert_eq!(stats.waiting, 1);
        assert_eq!(stats.delayed, 1);
        assert_eq!(stats.completed, 0);

        drain_until_settled(&engine).await;
        let stats = engine.stats().await;
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.delayed, 0);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        struct SlowProcessor;

        #[async_trait]
        impl WebhookProcessor for SlowProcessor {
            async fn process(
                &self,
                _event_id: &str,
                _payload: &serde_json::Value,
                _signature: Option<&str>,
            ) -> Result<()> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
        }

        let mut config = fast_config();
        config.processing_timeout_ms = 10;
        let engine = WebhookRetryEngine::new(Arc::new(SlowProcessor), config);

        let status = engine
            .process_webhook("evt_slow", serde_json::json!({}), None)
            .await
            .unwrap();
        assert_eq!(status.state, ProcessingState::Pending);
        assert!(status.last_error.unwrap().contains("timed out"));
    }
}
