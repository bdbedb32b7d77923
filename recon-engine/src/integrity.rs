//! Data integrity validator
//!
//! Runs a fixed battery of structural checks over a batch of internal
//! records. Findings become report entries, never errors; critical findings
//! raise a data-integrity alert.

use crate::models::*;
use crate::store::AlertStore;
use crate::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{info, warn};

/// Validator settings
#[derive(Debug, Clone)]
pub struct IntegrityConfig {
    /// Amounts above this ceiling are flagged as invalid
    pub amount_ceiling: Decimal,
    /// Tolerance for clock skew before a timestamp counts as future
    pub future_skew_seconds: i64,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            amount_ceiling: Decimal::from(10_000_000),
            future_skew_seconds: 60,
        }
    }
}

/// Scans internal records for structural defects
#[derive(Debug, Clone, Default)]
pub struct IntegrityValidator {
    config: IntegrityConfig,
}

impl IntegrityValidator {
    pub fn new(config: IntegrityConfig) -> Self {
        Self { config }
    }

    /// Validate a batch of records; raises a data-integrity alert when any
    /// finding is critical. Does not mutate records.
    pub async fn validate(
        &self,
        records: &[PaymentRecord],
        alerts: &dyn AlertStore,
    ) -> Result<IntegrityReport> {
        let (missing_txn, duplicate_events, invalid_amounts, orphaned) = tokio::join!(
            async { self.check_missing_transaction_ids(records) },
            async { self.check_duplicate_event_ids(records) },
            async { self.check_invalid_amounts(records) },
            async { self.check_orphaned_records(records) },
        );
        let (invalid_currency, inconsistent, duplicate_txns, future_ts) = tokio::join!(
            async { self.check_invalid_currencies(records) },
            async { self.check_inconsistent_status(records) },
            async { self.check_duplicate_transaction_ids(records) },
            async { self.check_future_timestamps(records) },
        );

        let mut issues = Vec::new();
        issues.extend(missing_txn);
        issues.extend(duplicate_events);
        issues.extend(invalid_amounts);
        issues.extend(orphaned);
        issues.extend(invalid_currency);
        issues.extend(inconsistent);
        issues.extend(duplicate_txns);
        issues.extend(future_ts);

        let report = IntegrityReport {
            records_checked: records.len() as u64,
            issues,
        };

        if report.has_critical() {
            warn!(
                issues = report.issues.len(),
                "critical integrity issues found, raising alert"
            );
            let alert = Alert::new(
                AlertType::DataIntegrity,
                Severity::Critical,
                serde_json::json!({
                    "records_checked": report.records_checked,
                    "issues": report.issues,
                }),
            );
            alerts.insert(alert).await?;
        } else {
            info!(
                records = report.records_checked,
                issues = report.issues.len(),
                "integrity validation complete"
            );
        }

        Ok(report)
    }

    fn check_missing_transaction_ids(&self, records: &[PaymentRecord]) -> Vec<IntegrityIssue> {
        records
            .iter()
            .filter(|r| r.transaction_id.as_deref().map_or(true, |t| t.is_empty()))
            .map(|r| IntegrityIssue {
                issue_type: IntegrityIssueType::MissingTransactionId,
                record_id: r.id,
                severity: Severity::High,
                suggested_action: "Backfill the processor transaction id".to_string(),
                detail: format!("event {} has no transaction id", r.event_id),
            })
            .collect()
    }

    fn check_duplicate_event_ids(&self, records: &[PaymentRecord]) -> Vec<IntegrityIssue> {
        let mut groups: HashMap<&str, Vec<&PaymentRecord>> = HashMap::new();
        for record in records {
            groups.entry(&record.event_id).or_default().push(record);
        }

        groups
            .into_iter()
            .filter(|(_, group)| group.len() > 1)
            .flat_map(|(event_id, group)| {
                let count = group.len();
                group
                    .into_iter()
                    .map(move |r| IntegrityIssue {
                        issue_type: IntegrityIssueType::DuplicateEventId,
                        record_id: r.id,
                        severity: Severity::Critical,
                        suggested_action: "Deduplicate and keep the earliest record".to_string(),
                        detail: format!("event id {} appears {} times", event_id, count),
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn check_invalid_amounts(&self, records: &[PaymentRecord]) -> Vec<IntegrityIssue> {
        records
            .iter()
            .filter_map(|r| {
                let detail = match r.amount {
                    None => format!("event {} has no amount", r.event_id),
                    Some(a) if a < Decimal::ZERO => {
                        format!("event {} has negative amount {}", r.event_id, a)
                    }
                    Some(a) if a > self.config.amount_ceiling => {
                        format!(
                            "event {} amount {} exceeds ceiling {}",
                            r.event_id, a, self.config.amount_ceiling
                        )
                    }
                    _ => return None,
                };
                Some(IntegrityIssue {
                    issue_type: IntegrityIssueType::InvalidAmount,
                    record_id: r.id,
                    severity: Severity::High,
                    suggested_action: "Verify the amount against the source payload".to_string(),
                    detail,
                })
            })
            .collect()
    }

    fn check_orphaned_records(&self, records: &[PaymentRecord]) -> Vec<IntegrityIssue> {
        records
            .iter()
            .filter(|r| r.subject_id.as_deref().map_or(true, |s| s.is_empty()))
            .map(|r| IntegrityIssue {
                issue_type: IntegrityIssueType::OrphanedRecord,
                record_id: r.id,
                severity: Severity::Medium,
                suggested_action: "Link the record to its owning subject".to_string(),
                detail: format!("event {} has no owning subject", r.event_id),
            })
            .collect()
    }

    fn check_invalid_currencies(&self, records: &[PaymentRecord]) -> Vec<IntegrityIssue> {
        records
            .iter()
            .filter(|r| !is_valid_currency(&r.currency))
            .map(|r| IntegrityIssue {
                issue_type: IntegrityIssueType::InvalidCurrency,
                record_id: r.id,
                severity: Severity::Medium,
                suggested_action: "Correct the currency to an ISO-4217 code".to_string(),
                detail: format!("event {} has currency '{}'", r.event_id, r.currency),
            })
            .collect()
    }

    // A record cannot be reconciled while its payment never settled
    fn check_inconsistent_status(&self, records: &[PaymentRecord]) -> Vec<IntegrityIssue> {
        records
            .iter()
            .filter(|r| {
                matches!(
                    r.status,
                    PaymentStatus::Pending | PaymentStatus::Processing | PaymentStatus::Failed
                ) && matches!(
                    r.reconciliation_status,
                    ReconciliationStatus::Reconciled | ReconciliationStatus::Resolved
                )
            })
            .map(|r| IntegrityIssue {
                issue_type: IntegrityIssueType::InconsistentStatus,
                record_id: r.id,
                severity: Severity::Medium,
                suggested_action: "Reset the reconciliation state for re-checking".to_string(),
                detail: format!(
                    "event {} is {} but marked {:?}",
                    r.event_id, r.status, r.reconciliation_status
                ),
            })
            .collect()
    }

    fn check_duplicate_transaction_ids(&self, records: &[PaymentRecord]) -> Vec<IntegrityIssue> {
        let mut groups: HashMap<&str, Vec<&PaymentRecord>> = HashMap::new();
        for record in records {
            if let Some(txn_id) = record.transaction_id.as_deref() {
                if !txn_id.is_empty() {
                    groups.entry(txn_id).or_default().push(record);
                }
            }
        }

        groups
            .into_iter()
            .filter(|(_, group)| group.len() > 1)
            .flat_map(|(txn_id, group)| {
                let count = group.len();
                group
                    .into_iter()
                    .map(move |r| IntegrityIssue {
                        issue_type: IntegrityIssueType::DuplicateTransactionId,
                        record_id: r.id,
                        severity: Severity::High,
                        suggested_action: "Investigate double ingestion of the transaction"
                            .to_string(),
                        detail: format!("transaction id {} appears {} times", txn_id, count),
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn check_future_timestamps(&self, records: &[PaymentRecord]) -> Vec<IntegrityIssue> {
        let horizon = Utc::now() + chrono::Duration::seconds(self.config.future_skew_seconds);
        records
            .iter()
            .filter(|r| r.created_at > horizon)
            .map(|r| IntegrityIssue {
                issue_type: IntegrityIssueType::FutureTimestamp,
                record_id: r.id,
                severity: Severity::Medium,
                suggested_action: "Check the source clock and re-stamp the record".to_string(),
                detail: format!("event {} created at {} is in the future", r.event_id, r.created_at),
            })
            .collect()
    }
}
