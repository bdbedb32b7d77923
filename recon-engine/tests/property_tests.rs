//! Property-based tests for comparator correctness
//!
//! These tests use proptest to verify:
//! - Every unmatched internal record yields exactly one missing-in-external
//! - Every unmatched external record yields exactly one missing-in-internal
//! - Identical matched records yield zero discrepancies

use chrono::Utc;
use proptest::prelude::*;
use recon_engine::comparator::{normalize_status, RecordComparator};
use recon_engine::memory::MemoryLedgerStore;
use recon_engine::*;
use rust_decimal::Decimal;
use std::collections::HashSet;
use uuid::Uuid;

/// Strategy for generating valid amounts (positive decimals, two places)
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1u64..1_000_000_00u64).prop_map(|cents| Decimal::new(cents as i64, 2))
}

/// Strategy for generating distinct transaction id suffixes
fn txn_ids_strategy() -> impl Strategy<Value = (HashSet<u32>, HashSet<u32>)> {
    (
        proptest::collection::hash_set(0u32..50, 0..15),
        proptest::collection::hash_set(0u32..50, 0..15),
    )
}

fn internal_record(txn: u32, amount: Decimal) -> PaymentRecord {
    PaymentRecord {
        id: Uuid::new_v4(),
        event_id: format!("evt_{}", txn),
        transaction_id: Some(format!("pi_{}", txn)),
        event_kind: PaymentEventKind::Succeeded,
        amount: Some(amount),
        currency: "USD".to_string(),
        status: PaymentStatus::Succeeded,
        subject_id: Some("cus_1".to_string()),
        metadata: serde_json::json!({}),
        raw_payload: serde_json::json!({}),
        created_at: Utc::now(),
        processed_at: None,
        reconciliation_status: ReconciliationStatus::NotReconciled,
        session_id: None,
    }
}

fn external_record(txn: u32, amount: Decimal) -> ExternalPaymentRecord {
    ExternalPaymentRecord {
        transaction_id: format!("pi_{}", txn),
        amount,
        currency: "USD".to_string(),
        status: "succeeded".to_string(),
        created_at: Utc::now(),
        metadata: serde_json::json!({}),
    }
}

proptest! {
    #[test]
    fn prop_missing_counts_match_set_difference(
        (internal_ids, external_ids) in txn_ids_strategy(),
        amount in amount_strategy(),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let internal: Vec<_> = internal_ids
                .iter()
                .map(|&t| internal_record(t, amount))
                .collect();
            let external: Vec<_> = external_ids
                .iter()
                .map(|&t| external_record(t, amount))
                .collect();

            let store = MemoryLedgerStore::new();
            let found = RecordComparator
                .compare(&internal, &external, Uuid::new_v4(), store.as_ref())
                .await
                .unwrap();

            let missing_external = found
                .iter()
                .filter(|d| d.discrepancy_type == DiscrepancyType::MissingInExternal)
                .count();
            let missing_internal = found
                .iter()
                .filter(|d| d.discrepancy_type == DiscrepancyType::MissingInInternal)
                .count();

            prop_assert_eq!(
                missing_external,
                internal_ids.difference(&external_ids).count()
            );
            prop_assert_eq!(
                missing_internal,
                external_ids.difference(&internal_ids).count()
            );

            // identical matched records contribute nothing else
            prop_assert_eq!(found.len(), missing_external + missing_internal);
            Ok(())
        })?;
    }

    #[test]
    fn prop_normalize_status_is_idempotent(status in "[a-zA-Z_]{1,20}") {
        let once = normalize_status(&status);
        let twice = normalize_status(&once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_currency_validation_matches_pattern(code in "\\PC{0,5}") {
        let expected = code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase());
        prop_assert_eq!(is_valid_currency(&code), expected);
    }
}
