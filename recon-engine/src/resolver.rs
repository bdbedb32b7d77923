//! Discrepancy auto-resolution
//!
//! Delegates each discrepancy to a pluggable rule; one failing item never
//! blocks the rest of the batch.

use crate::models::*;
use crate::store::DiscrepancyStore;
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Pluggable resolution rule evaluator
#[async_trait]
pub trait ResolutionRule: Send + Sync {
    /// Return true when the discrepancy can be closed automatically
    async fn try_resolve(&self, discrepancy: &Discrepancy) -> Result<bool>;
}

/// Rule that resolves discrepancies at or below a severity cap
pub struct SeverityCapRule {
    pub max_severity: Severity,
}

#[async_trait]
impl ResolutionRule for SeverityCapRule {
    async fn try_resolve(&self, discrepancy: &Discrepancy) -> Result<bool> {
        Ok(discrepancy.severity <= self.max_severity)
    }
}

/// Applies resolution rules to a batch of discrepancies
#[derive(Clone)]
pub struct DiscrepancyResolver {
    rule: Arc<dyn ResolutionRule>,
}

impl DiscrepancyResolver {
    pub fn new(rule: Arc<dyn ResolutionRule>) -> Self {
        Self { rule }
    }

    /// Resolver that only closes low-severity discrepancies
    pub fn conservative() -> Self {
        Self::new(Arc::new(SeverityCapRule {
            max_severity: Severity::Low,
        }))
    }

    /// Try to resolve each pending discrepancy in place, persisting updates.
    /// Rule failures are logged and leave the item pending. Returns the
    /// number resolved.
    pub async fn auto_resolve(
        &self,
        discrepancies: &mut [Discrepancy],
        store: &dyn DiscrepancyStore,
    ) -> u64 {
        let mut resolved = 0u64;

        for discrepancy in discrepancies.iter_mut() {
            if discrepancy.resolution_status == ResolutionStatus::Resolved {
                continue;
            }

            match self.rule.try_resolve(discrepancy).await {
                Ok(true) => {
                    discrepancy.resolution_status = ResolutionStatus::Resolved;
                    discrepancy.auto_resolved = true;
                    discrepancy.resolved_at = Some(Utc::now());

                    if let Err(e) = store.update(discrepancy).await {
                        warn!(
                            discrepancy = %discrepancy.id,
                            error = %e,
                            "failed to persist auto-resolution"
                        );
                        // keep the in-memory state; the next run re-persists
                        continue;
                    }
                    resolved += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        discrepancy = %discrepancy.id,
                        error = %e,
                        "resolution rule failed, leaving pending"
                    );
                }
            }
        }

        info!(
            total = discrepancies.len(),
            resolved, "auto-resolution pass complete"
        );
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLedgerStore;
    use crate::Error;
    use uuid::Uuid;

    fn discrepancy(severity: Severity) -> Discrepancy {
        Discrepancy {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            discrepancy_type: DiscrepancyType::CurrencyMismatch,
            severity,
            internal_snapshot: None,
            external_snapshot: None,
            resolution_status: ResolutionStatus::Pending,
            auto_resolved: false,
            resolved_at: None,
            description: "test".to_string(),
            detected_at: Utc::now(),
        }
    }

    struct FailingRule;

    #[async_trait]
    impl ResolutionRule for FailingRule {
        async fn try_resolve(&self, discrepancy: &Discrepancy) -> Result<bool> {
            if discrepancy.severity == Severity::Low {
                Err(Error::Internal("rule crashed".to_string()))
            } else {
                Ok(true)
            }
        }
    }

    #[tokio::test]
    async fn test_severity_cap_rule() {
        let store = MemoryLedgerStore::new();
        let resolver = DiscrepancyResolver::conservative();

        let mut batch = vec![discrepancy(Severity::Low), discrepancy(Severity::High)];
        for d in &batch {
            DiscrepancyStore::insert(store.as_ref(), d.clone())
                .await
                .unwrap();
        }

        let resolved = resolver.auto_resolve(&mut batch, store.as_ref()).await;
        assert_eq!(resolved, 1);
        assert_eq!(batch[0].resolution_status, ResolutionStatus::Resolved);
        assert!(batch[0].auto_resolved);
        assert!(batch[0].resolved_at.is_some());
        assert_eq!(batch[1].resolution_status, ResolutionStatus::Pending);
    }

    #[tokio::test]
    async fn test_rule_failure_does_not_block_batch() {
        let store = MemoryLedgerStore::new();
        let resolver = DiscrepancyResolver::new(Arc::new(FailingRule));

        let mut batch = vec![
            discrepancy(Severity::Low),    // rule errors
            discrepancy(Severity::Medium), // resolves
            discrepancy(Severity::High),   // resolves
        ];
        for d in &batch {
            DiscrepancyStore::insert(store.as_ref(), d.clone())
                .await
                .unwrap();
        }

        let resolved = resolver.auto_resolve(&mut batch, store.as_ref()).await;
        assert_eq!(resolved, 2);
        assert_eq!(batch[0].resolution_status, ResolutionStatus::Pending);
        assert_eq!(batch[1].resolution_status, ResolutionStatus::Resolved);
        assert_eq!(batch[2].resolution_status, ResolutionStatus::Resolved);
    }
}
