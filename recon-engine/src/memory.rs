//! In-memory ledger store backed by DashMap
//!
//! Implements every repository trait; used by tests and embedded setups.

use crate::models::*;
use crate::store::*;
use crate::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// In-memory implementation of the ledger store traits
#[derive(Default)]
pub struct MemoryLedgerStore {
    records: DashMap<Uuid, PaymentRecord>,
    // event_id -> record id index (idempotency lookups)
    event_index: DashMap<String, Uuid>,
    sessions: DashMap<Uuid, ReconciliationSession>,
    discrepancies: DashMap<Uuid, Discrepancy>,
    alerts: DashMap<Uuid, Alert>,
}

impl MemoryLedgerStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.len()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.iter().map(|e| e.value().clone()).collect()
    }

    pub fn sessions(&self) -> Vec<ReconciliationSession> {
        self.sessions.iter().map(|e| e.value().clone()).collect()
    }
}

#[async_trait]
impl PaymentRecordStore for MemoryLedgerStore {
    async fn insert(&self, record: PaymentRecord) -> Result<PaymentRecord> {
        if self.event_index.contains_key(&record.event_id) {
            return Err(Error::DuplicateEventId(record.event_id));
        }
        self.event_index.insert(record.event_id.clone(), record.id);
        self.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_event_id(&self, event_id: &str) -> Result<Option<PaymentRecord>> {
        Ok(self
            .event_index
            .get(event_id)
            .and_then(|id| self.records.get(&id).map(|r| r.value().clone())))
    }

    async fn find_by_transaction_id(&self, transaction_id: &str) -> Result<Option<PaymentRecord>> {
        Ok(self
            .records
            .iter()
            .find(|r| r.transaction_id.as_deref() == Some(transaction_id))
            .map(|r| r.value().clone()))
    }

    async fn find_in_window(
        &self,
        window: &SessionWindow,
        filter: &RecordFilter,
    ) -> Result<Vec<PaymentRecord>> {
        let mut records: Vec<PaymentRecord> = self
            .records
            .iter()
            .filter(|r| window.contains(r.created_at) && filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn count_in_window(&self, window: &SessionWindow) -> Result<u64> {
        Ok(self
            .records
            .iter()
            .filter(|r| window.contains(r.created_at))
            .count() as u64)
    }

    async fn update(&self, record: &PaymentRecord) -> Result<()> {
        if !self.records.contains_key(&record.id) {
            return Err(Error::RecordNotFound(record.event_id.clone()));
        }
        self.records.insert(record.id, record.clone());
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryLedgerStore {
    async fn insert(&self, session: ReconciliationSession) -> Result<ReconciliationSession> {
        self.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ReconciliationSession>> {
        Ok(self.sessions.get(&id).map(|s| s.value().clone()))
    }

    async fn update(&self, session: &ReconciliationSession) -> Result<()> {
        if !self.sessions.contains_key(&session.id) {
            return Err(Error::SessionNotFound(session.id));
        }
        self.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn average_processing_seconds(&self, session_type: SessionType) -> Result<Option<f64>> {
        let times: Vec<f64> = self
            .sessions
            .iter()
            .filter(|s| {
                s.session_type == session_type && s.status == SessionStatus::Completed
            })
            .filter_map(|s| s.processing_time_seconds)
            .collect();

        if times.is_empty() {
            Ok(None)
        } else {
            Ok(Some(times.iter().sum::<f64>() / times.len() as f64))
        }
    }
}

#[async_trait]
impl DiscrepancyStore for MemoryLedgerStore {
    async fn insert(&self, discrepancy: Discrepancy) -> Result<Discrepancy> {
        self.discrepancies
            .insert(discrepancy.id, discrepancy.clone());
        Ok(discrepancy)
    }

    async fn update(&self, discrepancy: &Discrepancy) -> Result<()> {
        if !self.discrepancies.contains_key(&discrepancy.id) {
            return Err(Error::Store(format!(
                "discrepancy not found: {}",
                discrepancy.id
            )));
        }
        self.discrepancies
            .insert(discrepancy.id, discrepancy.clone());
        Ok(())
    }

    async fn find_by_session(&self, session_id: Uuid) -> Result<Vec<Discrepancy>> {
        let mut found: Vec<Discrepancy> = self
            .discrepancies
            .iter()
            .filter(|d| d.session_id == session_id)
            .map(|d| d.value().clone())
            .collect();
        found.sort_by_key(|d| d.detected_at);
        Ok(found)
    }
}

#[async_trait]
impl AlertStore for MemoryLedgerStore {
    async fn insert(&self, alert: Alert) -> Result<Alert> {
        self.alerts.insert(alert.id, alert.clone());
        Ok(alert)
    }
}
