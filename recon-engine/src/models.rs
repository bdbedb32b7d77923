//! Core data model for ledger reconciliation

use chrono::{DateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

lazy_static::lazy_static! {
    static ref CURRENCY_RE: Regex = Regex::new(r"^[A-Z]{3}$").unwrap();
}

/// Check a currency code against the ISO-4217 3-letter form
pub fn is_valid_currency(code: &str) -> bool {
    CURRENCY_RE.is_match(code)
}

/// Payment lifecycle event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentEventKind {
    Created,
    Succeeded,
    Failed,
    Refunded,
    Disputed,
    Updated,
}

/// Internal payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
    Refunded,
    Disputed,
    Canceled,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Disputed => "disputed",
            PaymentStatus::Canceled => "canceled",
        };
        write!(f, "{}", s)
    }
}

/// Reconciliation state of a single record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    NotReconciled,
    Reconciled,
    Discrepancy,
    ManualReview,
    Resolved,
}

/// Internal record of one payment lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    /// External event id (unique, used as idempotency key)
    pub event_id: String,
    /// External transaction id at the processor
    pub transaction_id: Option<String>,
    pub event_kind: PaymentEventKind,
    pub amount: Option<Decimal>,
    pub currency: String,
    pub status: PaymentStatus,
    /// Owning subject (customer/account); None marks an orphaned record
    pub subject_id: Option<String>,
    /// Arbitrary metadata, preserved verbatim
    pub metadata: serde_json::Value,
    /// Raw source payload, preserved verbatim
    pub raw_payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub reconciliation_status: ReconciliationStatus,
    /// Session that last touched this record
    pub session_id: Option<Uuid>,
}

/// Processor-side view of one transaction (fetched per run, never persisted)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalPaymentRecord {
    pub transaction_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// How a reconciliation run was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Scheduled,
    Manual,
    RealTime,
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Canceled,
    Paused,
}

impl SessionStatus {
    /// Terminal states cannot be left
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Canceled
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Pending => "pending",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Canceled => "canceled",
            SessionStatus::Paused => "paused",
        };
        write!(f, "{}", s)
    }
}

/// Reconciliation window [start, end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SessionWindow {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    pub fn duration_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

/// Per-session configuration (thresholds, filters, auto-resolution)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionConfig {
    /// Currency allow-list; None keeps every currency
    pub currencies: Option<Vec<String>>,
    /// Minimum amount filter for internal records
    pub min_amount: Option<Decimal>,
    /// Maximum amount filter for internal records
    pub max_amount: Option<Decimal>,
    /// Override for the large-transaction floor
    pub large_transaction_floor: Option<Decimal>,
    /// Apply resolution rules to discrepancies after comparison
    pub auto_resolve: bool,
}

/// Step-level progress, persisted after every transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionProgress {
    pub current_step: Option<String>,
    pub completed_steps: Vec<String>,
    pub total_steps: u32,
}

impl Default for SessionProgress {
    fn default() -> Self {
        Self {
            current_step: None,
            completed_steps: Vec::new(),
            total_steps: crate::RECONCILIATION_STEPS.len() as u32,
        }
    }
}

/// Aggregate counters accumulated over a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionCounters {
    pub records_processed: u64,
    pub matched: u64,
    pub discrepancies_found: u64,
    pub auto_resolved: u64,
    pub manual_review: u64,
}

/// Volume metrics for one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub internal_records: u64,
    pub external_records: u64,
    pub integrity_issues: u64,
    pub anomalies: u64,
    pub patterns: u64,
}

/// Structured result attached to a completed session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResult {
    pub summary: String,
    pub discrepancy_ids: Vec<Uuid>,
    pub metrics: SessionMetrics,
    pub recommendations: Vec<String>,
}

/// One reconciliation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationSession {
    pub id: Uuid,
    pub session_type: SessionType,
    pub status: SessionStatus,
    pub window: SessionWindow,
    pub config: SessionConfig,
    pub progress: SessionProgress,
    pub counters: SessionCounters,
    pub result: Option<SessionResult>,
    pub error_message: Option<String>,
    /// Set when this session is a retry of a failed one
    pub parent_session_id: Option<Uuid>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_time_seconds: Option<f64>,
}

impl ReconciliationSession {
    /// New pending session for a window
    pub fn new(session_type: SessionType, window: SessionWindow, config: SessionConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_type,
            status: SessionStatus::Pending,
            window,
            config,
            progress: SessionProgress::default(),
            counters: SessionCounters::default(),
            result: None,
            error_message: None,
            parent_session_id: None,
            retry_count: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            processing_time_seconds: None,
        }
    }
}

/// Kind of mismatch found during comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyType {
    AmountMismatch,
    StatusMismatch,
    CurrencyMismatch,
    MissingInExternal,
    MissingInInternal,
}

impl std::fmt::Display for DiscrepancyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DiscrepancyType::AmountMismatch => "amount_mismatch",
            DiscrepancyType::StatusMismatch => "status_mismatch",
            DiscrepancyType::CurrencyMismatch => "currency_mismatch",
            DiscrepancyType::MissingInExternal => "missing_in_external",
            DiscrepancyType::MissingInInternal => "missing_in_internal",
        };
        write!(f, "{}", s)
    }
}

/// Severity shared by discrepancies, anomalies, issues and alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Pending,
    Resolved,
}

/// One mismatch between the internal and external ledgers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discrepancy {
    pub id: Uuid,
    pub session_id: Uuid,
    pub discrepancy_type: DiscrepancyType,
    pub severity: Severity,
    /// Snapshot of the internal record at detection time
    pub internal_snapshot: Option<serde_json::Value>,
    /// Snapshot of the external record at detection time
    pub external_snapshot: Option<serde_json::Value>,
    pub resolution_status: ResolutionStatus,
    pub auto_resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub description: String,
    pub detected_at: DateTime<Utc>,
}

/// Statistical anomaly kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    LargeTransaction,
    HighFailureRate,
    BurstActivity,
    HighVelocity,
}

impl std::fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AnomalyType::LargeTransaction => "large_transaction",
            AnomalyType::HighFailureRate => "high_failure_rate",
            AnomalyType::BurstActivity => "burst_activity",
            AnomalyType::HighVelocity => "high_velocity",
        };
        write!(f, "{}", s)
    }
}

/// One detected anomaly over a batch of records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    /// Confidence score in [0, 1]
    pub confidence: f64,
    /// External ids of the implicated records
    pub record_ids: Vec<String>,
    pub description: String,
    pub suggested_action: String,
}

/// Informational pattern (non-alerting)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorPattern {
    pub name: String,
    /// Share of the batch exhibiting the pattern, in [0, 1]
    pub share: f64,
    pub description: String,
}

/// Output of one anomaly-detection pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub anomalies: Vec<Anomaly>,
    pub patterns: Vec<BehaviorPattern>,
    pub records_analyzed: u64,
}

impl AnomalyReport {
    pub fn critical(&self) -> Vec<&Anomaly> {
        self.anomalies
            .iter()
            .filter(|a| a.severity == Severity::Critical)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    DataIntegrity,
    PaymentAnomaly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
    Suppressed,
    Escalated,
    Expired,
}

/// Notification-worthy event raised by the validator or detector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub alert_type: AlertType,
    pub severity: Severity,
    /// Free-form context blob (issue lists, anomaly batches)
    pub context: serde_json::Value,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(alert_type: AlertType, severity: Severity, context: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            alert_type,
            severity,
            context,
            status: AlertStatus::Active,
            created_at: Utc::now(),
        }
    }
}

/// Structural defect kind found by the integrity validator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityIssueType {
    MissingTransactionId,
    DuplicateEventId,
    InvalidAmount,
    OrphanedRecord,
    InvalidCurrency,
    InconsistentStatus,
    DuplicateTransactionId,
    FutureTimestamp,
}

impl std::fmt::Display for IntegrityIssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IntegrityIssueType::MissingTransactionId => "missing_transaction_id",
            IntegrityIssueType::DuplicateEventId => "duplicate_event_id",
            IntegrityIssueType::InvalidAmount => "invalid_amount",
            IntegrityIssueType::OrphanedRecord => "orphaned_record",
            IntegrityIssueType::InvalidCurrency => "invalid_currency",
            IntegrityIssueType::InconsistentStatus => "inconsistent_status",
            IntegrityIssueType::DuplicateTransactionId => "duplicate_transaction_id",
            IntegrityIssueType::FutureTimestamp => "future_timestamp",
        };
        write!(f, "{}", s)
    }
}

/// One structural defect on one record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityIssue {
    pub issue_type: IntegrityIssueType,
    pub record_id: Uuid,
    pub severity: Severity,
    pub suggested_action: String,
    pub detail: String,
}

/// Output of one integrity validation pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub records_checked: u64,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn count_of(&self, issue_type: IntegrityIssueType) -> usize {
        self.issues
            .iter()
            .filter(|i| i.issue_type == issue_type)
            .count()
    }

    pub fn has_critical(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Critical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_pattern() {
        assert!(is_valid_currency("USD"));
        assert!(is_valid_currency("EUR"));
        assert!(!is_valid_currency("usd"));
        assert!(!is_valid_currency("US"));
        assert!(!is_valid_currency("USDT"));
        assert!(!is_valid_currency(""));
    }

    #[test]
    fn test_session_status_terminal() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(SessionStatus::Canceled.is_terminal());
        assert!(!SessionStatus::Pending.is_terminal());
        assert!(!SessionStatus::InProgress.is_terminal());
        assert!(!SessionStatus::Paused.is_terminal());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_window_contains() {
        let window = SessionWindow {
            start: Utc::now() - chrono::Duration::hours(1),
            end: Utc::now() + chrono::Duration::hours(1),
        };
        assert!(window.contains(Utc::now()));
        assert!(!window.contains(window.end));
        assert!(window.contains(window.start));
    }
}
