//! Repository traits for the ledger store
//!
//! The durable implementation lives outside this crate; the engine only
//! needs these query shapes. [`crate::memory::MemoryLedgerStore`] provides
//! an in-memory implementation for tests and embedded use.

use crate::models::*;
use crate::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Filters applied when fetching internal records for a run
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Currency allow-list
    pub currencies: Option<Vec<String>>,
    /// Lower amount bound (inclusive)
    pub min_amount: Option<Decimal>,
    /// Upper amount bound (inclusive)
    pub max_amount: Option<Decimal>,
}

impl RecordFilter {
    /// Build the filter a session configuration describes
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            currencies: config.currencies.clone(),
            min_amount: config.min_amount,
            max_amount: config.max_amount,
        }
    }

    /// Check whether a record passes the filter
    pub fn matches(&self, record: &PaymentRecord) -> bool {
        if let Some(currencies) = &self.currencies {
            if !currencies.iter().any(|c| c == &record.currency) {
                return false;
            }
        }
        if let Some(min) = self.min_amount {
            if record.amount.map_or(true, |a| a < min) {
                return false;
            }
        }
        if let Some(max) = self.max_amount {
            if record.amount.map_or(true, |a| a > max) {
                return false;
            }
        }
        true
    }
}

/// Store of internal payment records
#[async_trait]
pub trait PaymentRecordStore: Send + Sync {
    /// Insert a new record; errors on duplicate event id
    async fn insert(&self, record: PaymentRecord) -> Result<PaymentRecord>;

    /// Find by external event id (idempotency key)
    async fn find_by_event_id(&self, event_id: &str) -> Result<Option<PaymentRecord>>;

    /// Find by external transaction id
    async fn find_by_transaction_id(&self, transaction_id: &str) -> Result<Option<PaymentRecord>>;

    /// Fetch all records created in a window, filtered
    async fn find_in_window(
        &self,
        window: &SessionWindow,
        filter: &RecordFilter,
    ) -> Result<Vec<PaymentRecord>>;

    /// Count records created in a window
    async fn count_in_window(&self, window: &SessionWindow) -> Result<u64>;

    /// Persist a single-record update
    async fn update(&self, record: &PaymentRecord) -> Result<()>;
}

/// Store of reconciliation sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: ReconciliationSession) -> Result<ReconciliationSession>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ReconciliationSession>>;

    async fn update(&self, session: &ReconciliationSession) -> Result<()>;

    /// Historical average processing time of completed sessions of a type,
    /// used for plan duration estimates
    async fn average_processing_seconds(&self, session_type: SessionType) -> Result<Option<f64>>;
}

/// Store of discrepancies
#[async_trait]
pub trait DiscrepancyStore: Send + Sync {
    async fn insert(&self, discrepancy: Discrepancy) -> Result<Discrepancy>;

    async fn update(&self, discrepancy: &Discrepancy) -> Result<()>;

    async fn find_by_session(&self, session_id: Uuid) -> Result<Vec<Discrepancy>>;
}

/// Store of alerts
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn insert(&self, alert: Alert) -> Result<Alert>;
}

/// Fire-and-observe audit log sink; failures must never abort the caller
pub trait AuditSink: Send + Sync {
    fn record(&self, action: &str, resource: &str, detail: serde_json::Value);
}

/// Default audit sink that writes structured log lines
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, action: &str, resource: &str, detail: serde_json::Value) {
        tracing::info!(action, resource, %detail, "audit");
    }
}
