//! Reconciliation orchestrator
//!
//! Drives a session through the five-step pipeline, persisting progress
//! after every transition so partially-completed runs stay observable.

use crate::anomaly::AnomalyDetector;
use crate::comparator::RecordComparator;
use crate::integrity::IntegrityValidator;
use crate::metrics::*;
use crate::models::*;
use crate::processor::{fetch_all_pages, FetchConfig, ProcessorClient};
use crate::resolver::DiscrepancyResolver;
use crate::store::*;
use crate::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Request for one reconciliation run
#[derive(Debug, Clone)]
pub struct ReconciliationParams {
    pub session_type: SessionType,
    pub window: SessionWindow,
    pub config: SessionConfig,
}

/// Result returned to the caller of a completed run
#[derive(Debug, Clone)]
pub struct ReconciliationOutcome {
    pub session: ReconciliationSession,
    pub discrepancies: Vec<Discrepancy>,
    pub metrics: SessionMetrics,
    pub recommendations: Vec<String>,
}

/// Pre-run estimate of a reconciliation window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationPlan {
    pub estimated_records: u64,
    pub estimated_duration_seconds: f64,
    pub steps: Vec<String>,
    pub risks: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Configuration validation result; errors are human-readable strings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

/// Windows larger than this are flagged as off-peak candidates
const LARGE_WINDOW_RECORDS: u64 = 10_000;
/// Poll interval while a session sits paused mid-run
const PAUSE_POLL_MS: u64 = 200;

/// Drives reconciliation sessions through validation, fetch, detection,
/// comparison and resolution
pub struct ReconciliationOrchestrator {
    records: Arc<dyn PaymentRecordStore>,
    sessions: Arc<dyn SessionStore>,
    discrepancies: Arc<dyn DiscrepancyStore>,
    alerts: Arc<dyn AlertStore>,
    processor: Arc<dyn ProcessorClient>,
    validator: IntegrityValidator,
    detector: AnomalyDetector,
    comparator: RecordComparator,
    resolver: DiscrepancyResolver,
    fetch: FetchConfig,
    audit: Arc<dyn AuditSink>,
}

impl ReconciliationOrchestrator {
    pub fn new(
        records: Arc<dyn PaymentRecordStore>,
        sessions: Arc<dyn SessionStore>,
        discrepancies: Arc<dyn DiscrepancyStore>,
        alerts: Arc<dyn AlertStore>,
        processor: Arc<dyn ProcessorClient>,
    ) -> Self {
        Self {
            records,
            sessions,
            discrepancies,
            alerts,
            processor,
            validator: IntegrityValidator::default(),
            detector: AnomalyDetector::default(),
            comparator: RecordComparator,
            resolver: DiscrepancyResolver::conservative(),
            fetch: FetchConfig::default(),
            audit: Arc::new(TracingAuditSink),
        }
    }

    pub fn with_validator(mut self, validator: IntegrityValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_detector(mut self, detector: AnomalyDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_resolver(mut self, resolver: DiscrepancyResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_fetch_config(mut self, fetch: FetchConfig) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Create a session for the window and run it to completion
    pub async fn perform_reconciliation(
        &self,
        params: ReconciliationParams,
    ) -> Result<ReconciliationOutcome> {
        let validation = Self::validate_config(&params);
        if !validation.is_valid {
            return Err(Error::Validation(validation.errors.join("; ")));
        }

        let session = ReconciliationSession::new(params.session_type, params.window, params.config);
        let session = self.sessions.insert(session).await?;
        self.run_session(session).await
    }

    /// Estimate a run before committing to it
    pub async fn generate_plan(&self, params: &ReconciliationParams) -> Result<ReconciliationPlan> {
        let estimated_records = self.records.count_in_window(&params.window).await?;

        let estimated_duration_seconds = match self
            .sessions
            .average_processing_seconds(params.session_type)
            .await?
        {
            Some(avg) => avg,
            // No history: assume a fixed floor plus per-record cost
            None => 5.0 + estimated_records as f64 * 0.01,
        };

        let mut risks = Vec::new();
        let mut recommendations = Vec::new();
        if estimated_records > LARGE_WINDOW_RECORDS {
            risks.push(format!(
                "window covers {} records; the run may be slow",
                estimated_records
            ));
            recommendations.push("Schedule this window during off-peak hours".to_string());
        }
        if params.window.duration_days() > 31 {
            risks.push("window spans more than a month of activity".to_string());
            recommendations
                .push("Split the window into smaller runs for faster feedback".to_string());
        }
        if recommendations.is_empty() {
            recommendations.push("Window size looks manageable".to_string());
        }

        Ok(ReconciliationPlan {
            estimated_records,
            estimated_duration_seconds,
            steps: crate::RECONCILIATION_STEPS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            risks,
            recommendations,
        })
    }

    /// Validate run parameters without side effects
    pub fn validate_config(params: &ReconciliationParams) -> ConfigValidation {
        let mut errors = Vec::new();

        if params.window.start >= params.window.end {
            errors.push("Start date must be before end date".to_string());
        }
        if params.window.duration_days() > 365 {
            errors.push("Date range cannot exceed 365 days".to_string());
        }

        let negative = [
            params.config.min_amount,
            params.config.max_amount,
            params.config.large_transaction_floor,
        ]
        .iter()
        .any(|t| t.map_or(false, |v| v.is_sign_negative()));
        if negative {
            errors.push("Thresholds cannot be negative".to_string());
        }

        if let (Some(min), Some(max)) = (params.config.min_amount, params.config.max_amount) {
            if min > max {
                errors.push("Minimum amount cannot exceed maximum amount".to_string());
            }
        }

        if let Some(currencies) = &params.config.currencies {
            for code in currencies {
                if !is_valid_currency(code) {
                    errors.push(format!("Invalid currency code: {}", code));
                }
            }
        }

        ConfigValidation {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// Pause an in-progress session; any other state is rejected
    pub async fn pause_session(&self, session_id: Uuid) -> Result<ReconciliationSession> {
        let mut session = self.load(session_id).await?;
        if session.status != SessionStatus::InProgress {
            return Err(Error::InvalidStateTransition {
                from: session.status.to_string(),
                action: "pause".to_string(),
            });
        }
        session.status = SessionStatus::Paused;
        self.sessions.update(&session).await?;
        self.audit.record(
            "session_paused",
            &session_id.to_string(),
            serde_json::json!({}),
        );
        info!(session = %session_id, "session paused");
        Ok(session)
    }

    /// Resume a paused session
    pub async fn resume_session(&self, session_id: Uuid) -> Result<ReconciliationSession> {
        let mut session = self.load(session_id).await?;
        if session.status != SessionStatus::Paused {
            return Err(Error::InvalidStateTransition {
                from: session.status.to_string(),
                action: "resume".to_string(),
            });
        }
        session.status = SessionStatus::InProgress;
        self.sessions.update(&session).await?;
        info!(session = %session_id, "session resumed");
        Ok(session)
    }

    /// Cancel from any non-terminal state, stamping completion immediately.
    /// In-flight step work is not aborted; it stops at the next step check.
    pub async fn cancel_session(&self, session_id: Uuid) -> Result<ReconciliationSession> {
        let mut session = self.load(session_id).await?;
        if session.status.is_terminal() {
            return Err(Error::InvalidStateTransition {
                from: session.status.to_string(),
                action: "cancel".to_string(),
            });
        }
        session.status = SessionStatus::Canceled;
        session.completed_at = Some(Utc::now());
        self.sessions.update(&session).await?;
        self.audit.record(
            "session_canceled",
            &session_id.to_string(),
            serde_json::json!({}),
        );
        warn!(session = %session_id, "session canceled");
        Ok(session)
    }

    /// Retry a failed session: creates and runs a new session linked to the
    /// failed one. The failed session keeps its own state; only its retry
    /// counter moves.
    pub async fn retry_failed_session(&self, session_id: Uuid) -> Result<ReconciliationOutcome> {
        let mut failed = self.load(session_id).await?;
        if failed.status != SessionStatus::Failed {
            return Err(Error::InvalidStateTransition {
                from: failed.status.to_string(),
                action: "retry".to_string(),
            });
        }

        failed.retry_count += 1;
        self.sessions.update(&failed).await?;

        let mut child =
            ReconciliationSession::new(failed.session_type, failed.window, failed.config.clone());
        child.parent_session_id = Some(failed.id);
        let child = self.sessions.insert(child).await?;

        info!(parent = %failed.id, child = %child.id, "retrying failed session");
        self.run_session(child).await
    }

    async fn load(&self, session_id: Uuid) -> Result<ReconciliationSession> {
        self.sessions
            .find_by_id(session_id)
            .await?
            .ok_or(Error::SessionNotFound(session_id))
    }

    async fn run_session(&self, mut session: ReconciliationSession) -> Result<ReconciliationOutcome> {
        session.status = SessionStatus::InProgress;
        session.started_at = Some(Utc::now());
        self.sessions.update(&session).await?;
        self.audit.record(
            "session_started",
            &session.id.to_string(),
            serde_json::json!({ "window_start": session.window.start, "window_end": session.window.end }),
        );

        match self.execute_steps(&mut session).await {
            Ok(outcome) => Ok(outcome),
            Err(Error::SessionCanceled(id)) => {
                // cancel() already stamped the terminal state
                RECON_SESSIONS_TOTAL
                    .with_label_values(&[session_type_label(session.session_type), "canceled"])
                    .inc();
                Err(Error::SessionCanceled(id))
            }
            Err(e) => {
                session.status = SessionStatus::Failed;
                session.error_message = Some(e.to_string());
                session.completed_at = Some(Utc::now());
                if let Err(persist_err) = self.sessions.update(&session).await {
                    error!(
                        session = %session.id,
                        error = %persist_err,
                        "failed to persist failed session"
                    );
                }
                RECON_SESSIONS_TOTAL
                    .with_label_values(&[session_type_label(session.session_type), "failed"])
                    .inc();
                error!(session = %session.id, error = %e, "reconciliation failed");
                Err(e)
            }
        }
    }

    async fn execute_steps(
        &self,
        session: &mut ReconciliationSession,
    ) -> Result<ReconciliationOutcome> {
        // Step 1: integrity over the unfiltered window
        self.begin_step(session, 0).await?;
        let window_records = self
            .records
            .find_in_window(&session.window, &RecordFilter::default())
            .await?;
        let integrity = self
            .validator
            .validate(&window_records, self.alerts.as_ref())
            .await?;
        self.complete_step(session, 0).await?;

        // Step 2: internal records with the configured filters
        self.begin_step(session, 1).await?;
        let filter = RecordFilter::from_config(&session.config);
        let internal = self.records.find_in_window(&session.window, &filter).await?;
        self.complete_step(session, 1).await?;

        // Step 3: paginated, rate-limited external fetch
        self.begin_step(session, 2).await?;
        let external = fetch_all_pages(self.processor.as_ref(), &session.window, &self.fetch).await?;
        self.complete_step(session, 2).await?;

        // Step 4: anomaly detection
        self.begin_step(session, 3).await?;
        let anomaly_report = self
            .detector
            .detect(&internal, &external, self.alerts.as_ref())
            .await?;
        self.complete_step(session, 3).await?;

        // Step 5: comparison and optional auto-resolution
        self.begin_step(session, 4).await?;
        let mut found = self
            .comparator
            .compare(&internal, &external, session.id, self.discrepancies.as_ref())
            .await?;
        let auto_resolved = if session.config.auto_resolve {
            self.resolver
                .auto_resolve(&mut found, self.discrepancies.as_ref())
                .await
        } else {
            0
        };
        self.complete_step(session, 4).await?;

        self.mark_records(session.id, &internal, &found).await?;

        let missing_in_external = found
            .iter()
            .filter(|d| d.discrepancy_type == DiscrepancyType::MissingInExternal)
            .count() as u64;
        let manual_review = found
            .iter()
            .filter(|d| d.resolution_status == ResolutionStatus::Pending)
            .count() as u64;

        session.counters = SessionCounters {
            records_processed: internal.len() as u64,
            matched: internal.len() as u64 - missing_in_external,
            discrepancies_found: found.len() as u64,
            auto_resolved,
            manual_review,
        };

        let metrics = SessionMetrics {
            internal_records: internal.len() as u64,
            external_records: external.len() as u64,
            integrity_issues: integrity.issues.len() as u64,
            anomalies: anomaly_report.anomalies.len() as u64,
            patterns: anomaly_report.patterns.len() as u64,
        };

        let recommendations = generate_recommendations(&found, &integrity, &anomaly_report);

        session.result = Some(SessionResult {
            summary: format!(
                "{} internal and {} external records compared; {} discrepancies ({} auto-resolved)",
                internal.len(),
                external.len(),
                found.len(),
                auto_resolved
            ),
            discrepancy_ids: found.iter().map(|d| d.id).collect(),
            metrics: metrics.clone(),
            recommendations: recommendations.clone(),
        });
        session.status = SessionStatus::Completed;
        session.completed_at = Some(Utc::now());
        if let (Some(started), Some(completed)) = (session.started_at, session.completed_at) {
            session.processing_time_seconds =
                Some((completed - started).num_milliseconds() as f64 / 1000.0);
        }
        // last status check before the terminal write
        self.await_active(session.id).await?;
        self.sessions.update(session).await?;

        let type_label = session_type_label(session.session_type);
        RECON_SESSIONS_TOTAL
            .with_label_values(&[type_label, "completed"])
            .inc();
        if let Some(secs) = session.processing_time_seconds {
            RECON_SESSION_DURATION
                .with_label_values(&[type_label])
                .observe(secs);
        }
        for discrepancy in &found {
            DISCREPANCIES_TOTAL
                .with_label_values(&[
                    &discrepancy.discrepancy_type.to_string(),
                    &discrepancy.severity.to_string(),
                ])
                .inc();
        }
        for anomaly in &anomaly_report.anomalies {
            ANOMALIES_TOTAL
                .with_label_values(&[&anomaly.anomaly_type.to_string(), &anomaly.severity.to_string()])
                .inc();
        }

        self.audit.record(
            "session_completed",
            &session.id.to_string(),
            serde_json::json!({ "discrepancies": found.len(), "auto_resolved": auto_resolved }),
        );
        info!(
            session = %session.id,
            discrepancies = found.len(),
            "reconciliation complete"
        );

        Ok(ReconciliationOutcome {
            session: session.clone(),
            discrepancies: found,
            metrics,
            recommendations,
        })
    }

    /// Check the persisted status before a step: stop on cancel, hold on
    /// pause, then record the step start
    async fn begin_step(&self, session: &mut ReconciliationSession, index: usize) -> Result<()> {
        self.await_active(session.id).await?;

        let step = crate::RECONCILIATION_STEPS[index];
        session.progress.current_step = Some(step.to_string());
        self.persist_progress(session).await?;
        info!(session = %session.id, step, "step started");
        Ok(())
    }

    async fn complete_step(&self, session: &mut ReconciliationSession, index: usize) -> Result<()> {
        let step = crate::RECONCILIATION_STEPS[index];
        session.progress.current_step = None;
        session.progress.completed_steps.push(step.to_string());
        self.persist_progress(session).await?;
        Ok(())
    }

    /// Hold while the stored session sits paused; stop once it is canceled
    async fn await_active(&self, session_id: Uuid) -> Result<()> {
        loop {
            let stored = self.load(session_id).await?;
            match stored.status {
                SessionStatus::Canceled => {
                    warn!(session = %session_id, "session canceled, stopping pipeline");
                    return Err(Error::SessionCanceled(session_id));
                }
                SessionStatus::Paused => {
                    tokio::time::sleep(Duration::from_millis(PAUSE_POLL_MS)).await;
                }
                _ => return Ok(()),
            }
        }
    }

    /// Write progress onto a freshly loaded copy of the session so a pause
    /// or cancel stamped while step work was in flight is never clobbered
    async fn persist_progress(&self, session: &mut ReconciliationSession) -> Result<()> {
        let mut stored = self.load(session.id).await?;
        if stored.status == SessionStatus::Canceled {
            warn!(session = %session.id, "session canceled, stopping pipeline");
            return Err(Error::SessionCanceled(session.id));
        }
        stored.progress = session.progress.clone();
        self.sessions.update(&stored).await?;
        session.status = stored.status;
        Ok(())
    }

    /// Single-record updates linking internal records to the session
    async fn mark_records(
        &self,
        session_id: Uuid,
        internal: &[PaymentRecord],
        discrepancies: &[Discrepancy],
    ) -> Result<()> {
        let flagged: HashSet<&str> = discrepancies
            .iter()
            .filter_map(|d| {
                d.internal_snapshot
                    .as_ref()
                    .and_then(|s| s.get("event_id"))
                    .and_then(|v| v.as_str())
            })
            .collect();

        for record in internal {
            let mut updated = record.clone();
            updated.session_id = Some(session_id);
            updated.reconciliation_status = if flagged.contains(record.event_id.as_str()) {
                ReconciliationStatus::Discrepancy
            } else {
                ReconciliationStatus::Reconciled
            };
            self.records.update(&updated).await?;
        }
        Ok(())
    }
}

/// Human-readable follow-ups derived purely from the three reports
pub fn generate_recommendations(
    discrepancies: &[Discrepancy],
    integrity: &IntegrityReport,
    anomalies: &AnomalyReport,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    let high = discrepancies
        .iter()
        .filter(|d| d.severity >= Severity::High)
        .count();
    if high > 0 {
        recommendations.push(format!(
            "{} high-severity discrepancies require manual review",
            high
        ));
    }

    let missing_external = discrepancies
        .iter()
        .filter(|d| d.discrepancy_type == DiscrepancyType::MissingInExternal)
        .count();
    if missing_external > 0 {
        recommendations.push(format!(
            "{} internal records are missing from the processor ledger; verify export completeness",
            missing_external
        ));
    }

    let missing_internal = discrepancies
        .iter()
        .filter(|d| d.discrepancy_type == DiscrepancyType::MissingInInternal)
        .count();
    if missing_internal > 0 {
        recommendations.push(format!(
            "{} processor transactions have no internal record; check webhook ingestion for gaps",
            missing_internal
        ));
    }

    let invalid = integrity.count_of(IntegrityIssueType::InvalidAmount)
        + integrity.count_of(IntegrityIssueType::InvalidCurrency);
    if invalid > 0 {
        recommendations.push(format!(
            "{} records carry invalid amounts or currencies; clean them up before the next run",
            invalid
        ));
    }

    let duplicates = integrity.count_of(IntegrityIssueType::DuplicateEventId)
        + integrity.count_of(IntegrityIssueType::DuplicateTransactionId);
    if duplicates > 0 {
        recommendations.push(format!(
            "{} duplicate records detected; deduplicate the ledger",
            duplicates
        ));
    }

    let critical_anomalies = anomalies.critical().len();
    if critical_anomalies > 0 {
        recommendations.push(format!(
            "{} critical anomalies flagged; escalate to the risk team",
            critical_anomalies
        ));
    }

    if recommendations.is_empty() {
        recommendations.push("Reconciliation clean: no action required".to_string());
    }
    recommendations
}

fn session_type_label(session_type: SessionType) -> &'static str {
    match session_type {
        SessionType::Scheduled => "scheduled",
        SessionType::Manual => "manual",
        SessionType::RealTime => "real_time",
    }
}
