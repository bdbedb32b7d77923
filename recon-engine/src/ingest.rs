//! Idempotent payment-log ingestion
//!
//! Deduplicates on the external event id: repeated delivery of the same
//! event returns the record stored by the first delivery.

use crate::models::*;
use crate::store::PaymentRecordStore;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Inbound payment log event, as delivered by the processor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentLogEvent {
    pub event_id: String,
    pub transaction_id: Option<String>,
    pub event_kind: PaymentEventKind,
    pub amount: Option<Decimal>,
    pub currency: String,
    pub status: PaymentStatus,
    pub subject_id: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub raw_payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Per-item failure in a batch ingest
#[derive(Debug, Clone, Serialize)]
pub struct BatchIngestError {
    pub event_id: String,
    pub error: String,
}

/// Outcome of a batch ingest; item failures never fail the batch
#[derive(Debug, Default)]
pub struct BatchIngestResult {
    pub ingested: Vec<PaymentRecord>,
    pub errors: Vec<BatchIngestError>,
}

/// Writes payment log events into the ledger store
#[derive(Clone)]
pub struct PaymentIngestor {
    records: Arc<dyn PaymentRecordStore>,
}

impl PaymentIngestor {
    pub fn new(records: Arc<dyn PaymentRecordStore>) -> Self {
        Self { records }
    }

    /// Ingest one event. A duplicate event id returns the already-stored
    /// record without creating a second one.
    pub async fn ingest(&self, event: PaymentLogEvent) -> Result<PaymentRecord> {
        if let Some(existing) = self.records.find_by_event_id(&event.event_id).await? {
            debug!(event_id = %event.event_id, "duplicate delivery, returning stored record");
            return Ok(existing);
        }

        self.validate(&event)?;

        let record = PaymentRecord {
            id: Uuid::new_v4(),
            event_id: event.event_id,
            transaction_id: event.transaction_id,
            event_kind: event.event_kind,
            amount: event.amount,
            currency: event.currency,
            status: event.status,
            subject_id: event.subject_id,
            metadata: event.metadata,
            raw_payload: event.raw_payload,
            created_at: event.created_at,
            processed_at: Some(Utc::now()),
            reconciliation_status: ReconciliationStatus::NotReconciled,
            session_id: None,
        };

        match self.records.insert(record).await {
            Ok(stored) => {
                info!(event_id = %stored.event_id, "payment log ingested");
                Ok(stored)
            }
            // Lost the race against a concurrent delivery of the same event
            Err(Error::DuplicateEventId(event_id)) => self
                .records
                .find_by_event_id(&event_id)
                .await?
                .ok_or(Error::RecordNotFound(event_id)),
            Err(e) => Err(e),
        }
    }

    /// Ingest a batch, collecting per-item errors instead of failing whole
    pub async fn ingest_batch(&self, events: Vec<PaymentLogEvent>) -> BatchIngestResult {
        let mut result = BatchIngestResult::default();

        for event in events {
            let event_id = event.event_id.clone();
            match self.ingest(event).await {
                Ok(record) => result.ingested.push(record),
                Err(e) => result.errors.push(BatchIngestError {
                    event_id,
                    error: e.to_string(),
                }),
            }
        }

        result
    }

    fn validate(&self, event: &PaymentLogEvent) -> Result<()> {
        if event.event_id.is_empty() {
            return Err(Error::Validation("event id cannot be empty".to_string()));
        }
        if !is_valid_currency(&event.currency) {
            return Err(Error::Validation(format!(
                "invalid currency code: {}",
                event.currency
            )));
        }
        if event.status == PaymentStatus::Succeeded {
            match event.amount {
                Some(a) if a >= Decimal::ZERO => {}
                _ => {
                    return Err(Error::Validation(format!(
                        "succeeded event {} requires a non-negative amount",
                        event.event_id
                    )))
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLedgerStore;
    use rust_decimal_macros::dec;

    fn event(event_id: &str) -> PaymentLogEvent {
        PaymentLogEvent {
            event_id: event_id.to_string(),
            transaction_id: Some(format!("pi_{}", event_id)),
            event_kind: PaymentEventKind::Succeeded,
            amount: Some(dec!(100.00)),
            currency: "USD".to_string(),
            status: PaymentStatus::Succeeded,
            subject_id: Some("cus_1".to_string()),
            metadata: serde_json::json!({}),
            raw_payload: serde_json::json!({"type": "payment.succeeded"}),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_delivery_returns_same_record() {
        let store = MemoryLedgerStore::new();
        let ingestor = PaymentIngestor::new(store.clone());

        let first = ingestor.ingest(event("evt_1")).await.unwrap();
        let second = ingestor.ingest(event("evt_1")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.record_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_currency_rejected() {
        let store = MemoryLedgerStore::new();
        let ingestor = PaymentIngestor::new(store);

        let mut bad = event("evt_bad");
        bad.currency = "usd".to_string();
        assert!(matches!(
            ingestor.ingest(bad).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_succeeded_requires_non_negative_amount() {
        let store = MemoryLedgerStore::new();
        let ingestor = PaymentIngestor::new(store);

        let mut negative = event("evt_neg");
        negative.amount = Some(dec!(-10.00));
        assert!(ingestor.ingest(negative).await.is_err());

        let mut missing = event("evt_null");
        missing.amount = None;
        assert!(ingestor.ingest(missing).await.is_err());

        // failed events may carry no amount
        let mut failed = event("evt_failed");
        failed.status = PaymentStatus::Failed;
        failed.amount = None;
        assert!(ingestor.ingest(failed).await.is_ok());
    }

    #[tokio::test]
    async fn test_batch_collects_item_errors() {
        let store = MemoryLedgerStore::new();
        let ingestor = PaymentIngestor::new(store.clone());

        let mut bad = event("evt_b");
        bad.currency = "EURO".to_string();

        let result = ingestor
            .ingest_batch(vec![event("evt_a"), bad, event("evt_c")])
            .await;
        assert_eq!(result.ingested.len(), 2);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].event_id, "evt_b");
        assert_eq!(store.record_count(), 2);
    }
}
