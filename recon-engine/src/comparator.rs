//! Record comparator
//!
//! Hash-indexed diff of the internal and external ledgers. Every
//! discrepancy is persisted immediately, tied to the session.

use crate::models::*;
use crate::store::DiscrepancyStore;
use crate::Result;
use chrono::Utc;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

/// Collapse processor-specific substates into a comparable status.
/// Unrecognized values pass through lower-cased.
pub fn normalize_status(status: &str) -> String {
    match status.to_ascii_lowercase().as_str() {
        "succeeded" | "success" | "paid" | "complete" | "completed" | "settled" | "refunded" => {
            "completed".to_string()
        }
        "failed" | "failure" | "declined" | "error" => "failed".to_string(),
        "canceled" | "cancelled" | "voided" | "expired" => "cancelled".to_string(),
        "pending" | "processing" | "requires_action" | "requires_confirmation"
        | "requires_capture" | "created" | "in_progress" | "disputed" => "pending".to_string(),
        other => other.to_string(),
    }
}

/// Diffs internal against external record sets
#[derive(Debug, Clone, Default)]
pub struct RecordComparator;

impl RecordComparator {
    /// Compare both sides and persist each discrepancy as it is found.
    /// O(n+m) over hashed indices.
    pub async fn compare(
        &self,
        internal: &[PaymentRecord],
        external: &[ExternalPaymentRecord],
        session_id: Uuid,
        store: &dyn DiscrepancyStore,
    ) -> Result<Vec<Discrepancy>> {
        let external_index: HashMap<&str, &ExternalPaymentRecord> = external
            .iter()
            .map(|r| (r.transaction_id.as_str(), r))
            .collect();
        let internal_index: HashMap<&str, &PaymentRecord> = internal
            .iter()
            .filter_map(|r| r.transaction_id.as_deref().map(|t| (t, r)))
            .collect();

        let mut discrepancies = Vec::new();

        for record in internal {
            let matched = record
                .transaction_id
                .as_deref()
                .and_then(|t| external_index.get(t));

            match matched {
                None => {
                    discrepancies.push(self.build(
                        session_id,
                        DiscrepancyType::MissingInExternal,
                        Severity::High,
                        Some(record),
                        None,
                        format!(
                            "internal event {} has no matching processor transaction",
                            record.event_id
                        ),
                    )?);
                }
                Some(ext) => {
                    if record.amount != Some(ext.amount) {
                        discrepancies.push(self.build(
                            session_id,
                            DiscrepancyType::AmountMismatch,
                            Severity::Medium,
                            Some(record),
                            Some(ext),
                            format!(
                                "amount mismatch for {}: internal {:?} vs external {}",
                                ext.transaction_id, record.amount, ext.amount
                            ),
                        )?);
                    }

                    let internal_status = normalize_status(&record.status.to_string());
                    let external_status = normalize_status(&ext.status);
                    if internal_status != external_status {
                        discrepancies.push(self.build(
                            session_id,
                            DiscrepancyType::StatusMismatch,
                            Severity::Medium,
                            Some(record),
                            Some(ext),
                            format!(
                                "status mismatch for {}: internal {} vs external {}",
                                ext.transaction_id, internal_status, external_status
                            ),
                        )?);
                    }

                    if record.currency != ext.currency {
                        discrepancies.push(self.build(
                            session_id,
                            DiscrepancyType::CurrencyMismatch,
                            Severity::Low,
                            Some(record),
                            Some(ext),
                            format!(
                                "currency mismatch for {}: internal {} vs external {}",
                                ext.transaction_id, record.currency, ext.currency
                            ),
                        )?);
                    }
                }
            }
        }

        for ext in external {
            if !internal_index.contains_key(ext.transaction_id.as_str()) {
                discrepancies.push(self.build(
                    session_id,
                    DiscrepancyType::MissingInInternal,
                    Severity::High,
                    None,
                    Some(ext),
                    format!(
                        "processor transaction {} has no internal record",
                        ext.transaction_id
                    ),
                )?);
            }
        }

        for discrepancy in &discrepancies {
            store.insert(discrepancy.clone()).await?;
        }

        info!(
            session = %session_id,
            internal = internal.len(),
            external = external.len(),
            discrepancies = discrepancies.len(),
            "comparison complete"
        );

        Ok(discrepancies)
    }

    fn build(
        &self,
        session_id: Uuid,
        discrepancy_type: DiscrepancyType,
        severity: Severity,
        internal: Option<&PaymentRecord>,
        external: Option<&ExternalPaymentRecord>,
        description: String,
    ) -> Result<Discrepancy> {
        Ok(Discrepancy {
            id: Uuid::new_v4(),
            session_id,
            discrepancy_type,
            severity,
            internal_snapshot: internal.map(serde_json::to_value).transpose()?,
            external_snapshot: external.map(serde_json::to_value).transpose()?,
            resolution_status: ResolutionStatus::Pending,
            auto_resolved: false,
            resolved_at: None,
            description,
            detected_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLedgerStore;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn internal(txn_id: &str, amount: Decimal, status: PaymentStatus) -> PaymentRecord {
        PaymentRecord {
            id: Uuid::new_v4(),
            event_id: format!("evt_{}", txn_id),
            transaction_id: Some(txn_id.to_string()),
            event_kind: PaymentEventKind::Succeeded,
            amount: Some(amount),
            currency: "USD".to_string(),
            status,
            subject_id: Some("cus_1".to_string()),
            metadata: serde_json::json!({}),
            raw_payload: serde_json::json!({}),
            created_at: Utc::now(),
            processed_at: None,
            reconciliation_status: ReconciliationStatus::NotReconciled,
            session_id: None,
        }
    }

    fn external(txn_id: &str, amount: Decimal, status: &str) -> ExternalPaymentRecord {
        ExternalPaymentRecord {
            transaction_id: txn_id.to_string(),
            amount,
            currency: "USD".to_string(),
            status: status.to_string(),
            created_at: Utc::now(),
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn test_status_normalization() {
        assert_eq!(normalize_status("succeeded"), "completed");
        assert_eq!(normalize_status("requires_action"), "pending");
        assert_eq!(normalize_status("processing"), "pending");
        assert_eq!(normalize_status("CANCELED"), "cancelled");
        assert_eq!(normalize_status("declined"), "failed");
        // unrecognized passes through lower-cased
        assert_eq!(normalize_status("Weird_State"), "weird_state");
    }

    #[tokio::test]
    async fn test_matched_records_produce_no_discrepancies() {
        let store = MemoryLedgerStore::new();
        let comparator = RecordComparator;
        let session_id = Uuid::new_v4();

        let found = comparator
            .compare(
                &[internal("pi_1", dec!(100.00), PaymentStatus::Succeeded)],
                &[external("pi_1", dec!(100.00), "succeeded")],
                session_id,
                store.as_ref(),
            )
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_amount_mismatch() {
        let store = MemoryLedgerStore::new();
        let comparator = RecordComparator;
        let session_id = Uuid::new_v4();

        let found = comparator
            .compare(
                &[internal("pi_1", dec!(100.00), PaymentStatus::Succeeded)],
                &[external("pi_1", dec!(105.00), "succeeded")],
                session_id,
                store.as_ref(),
            )
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].discrepancy_type, DiscrepancyType::AmountMismatch);
        assert_eq!(found[0].severity, Severity::Medium);
        // persisted, tied to the session
        let stored = store.find_by_session(session_id).await.unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_on_both_sides() {
        let store = MemoryLedgerStore::new();
        let comparator = RecordComparator;
        let session_id = Uuid::new_v4();

        let found = comparator
            .compare(
                &[
                    internal("pi_only_internal", dec!(10.00), PaymentStatus::Succeeded),
                    internal("pi_both", dec!(20.00), PaymentStatus::Succeeded),
                ],
                &[
                    external("pi_both", dec!(20.00), "succeeded"),
                    external("pi_only_external", dec!(30.00), "succeeded"),
                ],
                session_id,
                store.as_ref(),
            )
            .await
            .unwrap();

        assert_eq!(found.len(), 2);
        assert!(found.iter().any(|d| {
            d.discrepancy_type == DiscrepancyType::MissingInExternal
                && d.severity == Severity::High
        }));
        assert!(found.iter().any(|d| {
            d.discrepancy_type == DiscrepancyType::MissingInInternal
                && d.severity == Severity::High
        }));
    }

    #[tokio::test]
    async fn test_internal_record_without_transaction_id() {
        let store = MemoryLedgerStore::new();
        let comparator = RecordComparator;

        let mut record = internal("pi_x", dec!(10.00), PaymentStatus::Succeeded);
        record.transaction_id = None;

        let found = comparator
            .compare(&[record], &[], Uuid::new_v4(), store.as_ref())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0].discrepancy_type,
            DiscrepancyType::MissingInExternal
        );
    }

    #[tokio::test]
    async fn test_normalized_status_suppresses_substate_noise() {
        let store = MemoryLedgerStore::new();
        let comparator = RecordComparator;

        // internal pending vs processor "requires_action" both normalize to pending
        let found = comparator
            .compare(
                &[internal("pi_1", dec!(50.00), PaymentStatus::Pending)],
                &[external("pi_1", dec!(50.00), "requires_action")],
                Uuid::new_v4(),
                store.as_ref(),
            )
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_currency_mismatch_low_severity() {
        let store = MemoryLedgerStore::new();
        let comparator = RecordComparator;

        let mut ext = external("pi_1", dec!(50.00), "succeeded");
        ext.currency = "EUR".to_string();

        let found = comparator
            .compare(
                &[internal("pi_1", dec!(50.00), PaymentStatus::Succeeded)],
                &[ext],
                Uuid::new_v4(),
                store.as_ref(),
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].discrepancy_type, DiscrepancyType::CurrencyMismatch);
        assert_eq!(found[0].severity, Severity::Low);
    }
}
