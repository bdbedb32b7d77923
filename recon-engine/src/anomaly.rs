//! Statistical anomaly detection over payment batches
//!
//! Independent heuristics run concurrently and merge into one report.
//! Thresholds are configurable; the defaults mirror operational experience
//! rather than derived values.

use crate::models::*;
use crate::store::AlertStore;
use crate::Result;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{info, warn};

/// Detector thresholds
#[derive(Debug, Clone)]
pub struct AnomalyConfig {
    /// Floor for the large-transaction threshold (max of this and p95)
    pub large_transaction_floor: Decimal,
    /// Mean flagged amount above this makes the anomaly critical
    pub large_transaction_critical_mean: Decimal,
    /// Flagged-record count above this makes the anomaly high severity
    pub large_transaction_high_count: usize,
    /// Failure rate above this is flagged
    pub failure_rate_flag: f64,
    /// Failure rate above this is high severity
    pub failure_rate_high: f64,
    /// Failure rate above this is critical
    pub failure_rate_critical: f64,
    /// Bucket width for burst detection
    pub burst_window_seconds: i64,
    /// Bucket count above `multiplier * mean` is flagged
    pub burst_multiplier: f64,
    /// Bucket count above `high_multiplier * mean` is high severity
    pub burst_high_multiplier: f64,
    /// Consecutive same-subject payments closer than this are flagged
    pub velocity_interval_seconds: i64,
    /// Gaps below this make the velocity anomaly high severity
    pub velocity_high_seconds: i64,
    /// Currency share above this is reported as a concentration pattern
    pub currency_concentration_share: f64,
    /// Hour-of-day share above this is reported as a peak-hour pattern
    pub peak_hour_share: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            large_transaction_floor: Decimal::from(10_000),
            large_transaction_critical_mean: Decimal::from(50_000),
            large_transaction_high_count: 10,
            failure_rate_flag: 0.10,
            failure_rate_high: 0.20,
            failure_rate_critical: 0.30,
            burst_window_seconds: 3600,
            burst_multiplier: 3.0,
            burst_high_multiplier: 6.0,
            velocity_interval_seconds: 60,
            velocity_high_seconds: 10,
            currency_concentration_share: 0.80,
            peak_hour_share: 0.20,
        }
    }
}

/// Applies statistical heuristics to flag suspicious payment behavior
#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector {
    config: AnomalyConfig,
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig) -> Self {
        Self { config }
    }

    /// Run every heuristic over the batch and merge the findings.
    /// Critical anomalies raise a payment-anomaly alert; the function is
    /// otherwise pure over its inputs.
    pub async fn detect(
        &self,
        internal: &[PaymentRecord],
        external: &[ExternalPaymentRecord],
        alerts: &dyn AlertStore,
    ) -> Result<AnomalyReport> {
        let (large, failure, burst, velocity) = tokio::join!(
            async { self.detect_large_transactions(internal, external) },
            async { self.detect_high_failure_rate(internal) },
            async { self.detect_burst_activity(internal) },
            async { self.detect_high_velocity(internal) },
        );

        let mut anomalies = Vec::new();
        anomalies.extend(large);
        anomalies.extend(failure);
        anomalies.extend(burst);
        anomalies.extend(velocity);

        let patterns = self.detect_patterns(internal);

        let report = AnomalyReport {
            anomalies,
            patterns,
            records_analyzed: (internal.len() + external.len()) as u64,
        };

        let critical = report.critical();
        if !critical.is_empty() {
            warn!(
                count = critical.len(),
                "critical anomalies detected, raising alert"
            );
            let alert = Alert::new(
                AlertType::PaymentAnomaly,
                Severity::Critical,
                serde_json::json!({
                    "anomalies": report.anomalies,
                    "records_analyzed": report.records_analyzed,
                }),
            );
            alerts.insert(alert).await?;
        } else {
            info!(
                anomalies = report.anomalies.len(),
                patterns = report.patterns.len(),
                "anomaly detection complete"
            );
        }

        Ok(report)
    }

    /// Flag amounts above max(p95 of the batch, configured floor)
    fn detect_large_transactions(
        &self,
        internal: &[PaymentRecord],
        external: &[ExternalPaymentRecord],
    ) -> Vec<Anomaly> {
        // (external id, amount) pairs from both ledgers
        let mut amounts: Vec<(String, Decimal)> = internal
            .iter()
            .filter_map(|r| r.amount.map(|a| (r.event_id.clone(), a)))
            .collect();
        amounts.extend(
            external
                .iter()
                .map(|r| (r.transaction_id.clone(), r.amount)),
        );

        if amounts.is_empty() {
            return Vec::new();
        }

        let mut sorted: Vec<Decimal> = amounts.iter().map(|(_, a)| *a).collect();
        sorted.sort();
        let p95 = percentile(&sorted, 0.95);
        let threshold = p95.max(self.config.large_transaction_floor);

        let flagged: Vec<(String, Decimal)> = amounts
            .into_iter()
            .filter(|(_, a)| *a > threshold)
            .collect();
        if flagged.is_empty() {
            return Vec::new();
        }

        let total: Decimal = flagged.iter().map(|(_, a)| *a).sum();
        let mean = total / Decimal::from(flagged.len() as u64);
        let severity = if mean > self.config.large_transaction_critical_mean {
            Severity::Critical
        } else if flagged.len() > self.config.large_transaction_high_count {
            Severity::High
        } else {
            Severity::Medium
        };

        vec![Anomaly {
            anomaly_type: AnomalyType::LargeTransaction,
            severity,
            confidence: 0.8,
            record_ids: flagged.iter().map(|(id, _)| id.clone()).collect(),
            description: format!(
                "{} transactions above threshold {} (p95-based), mean {}",
                flagged.len(),
                threshold,
                mean.round_dp(2)
            ),
            suggested_action: "Review flagged transactions for legitimacy".to_string(),
        }]
    }

    /// Flag the batch when the failure rate exceeds the configured bound
    fn detect_high_failure_rate(&self, internal: &[PaymentRecord]) -> Vec<Anomaly> {
        if internal.is_empty() {
            return Vec::new();
        }

        let failed: Vec<&PaymentRecord> = internal
            .iter()
            .filter(|r| r.status == PaymentStatus::Failed)
            .collect();
        let rate = failed.len() as f64 / internal.len() as f64;

        if rate <= self.config.failure_rate_flag {
            return Vec::new();
        }

        let severity = if rate > self.config.failure_rate_critical {
            Severity::Critical
        } else if rate > self.config.failure_rate_high {
            Severity::High
        } else {
            Severity::Medium
        };

        vec![Anomaly {
            anomaly_type: AnomalyType::HighFailureRate,
            severity,
            confidence: 0.9,
            record_ids: failed.iter().map(|r| r.event_id.clone()).collect(),
            description: format!(
                "failure rate {:.1}% ({}/{} records)",
                rate * 100.0,
                failed.len(),
                internal.len()
            ),
            suggested_action: "Check processor health and card decline reasons".to_string(),
        }]
    }

    /// Flag time buckets whose volume exceeds a multiple of the mean
    fn detect_burst_activity(&self, internal: &[PaymentRecord]) -> Vec<Anomaly> {
        if internal.is_empty() {
            return Vec::new();
        }

        let mut buckets: HashMap<i64, Vec<&PaymentRecord>> = HashMap::new();
        for record in internal {
            let bucket = record.created_at.timestamp() / self.config.burst_window_seconds;
            buckets.entry(bucket).or_default().push(record);
        }

        let mean = internal.len() as f64 / buckets.len() as f64;
        let mut anomalies = Vec::new();

        for (bucket, records) in buckets {
            let count = records.len() as f64;
            if count > mean * self.config.burst_multiplier {
                let severity = if count > mean * self.config.burst_high_multiplier {
                    Severity::High
                } else {
                    Severity::Medium
                };
                anomalies.push(Anomaly {
                    anomaly_type: AnomalyType::BurstActivity,
                    severity,
                    confidence: 0.7,
                    record_ids: records.iter().map(|r| r.event_id.clone()).collect(),
                    description: format!(
                        "bucket {} holds {} records against a mean of {:.1}",
                        bucket, records.len(), mean
                    ),
                    suggested_action: "Inspect the burst window for replayed or scripted traffic"
                        .to_string(),
                });
            }
        }

        anomalies
    }

    /// Flag same-subject payments landing closer than the configured gap
    fn detect_high_velocity(&self, internal: &[PaymentRecord]) -> Vec<Anomaly> {
        let mut per_subject: HashMap<&str, Vec<&PaymentRecord>> = HashMap::new();
        for record in internal {
            if let Some(subject) = record.subject_id.as_deref() {
                per_subject.entry(subject).or_default().push(record);
            }
        }

        let mut anomalies = Vec::new();
        for (subject, mut records) in per_subject {
            records.sort_by_key(|r| r.created_at);

            let mut flagged: Vec<String> = Vec::new();
            let mut min_gap = i64::MAX;
            for pair in records.windows(2) {
                let gap = (pair[1].created_at - pair[0].created_at).num_seconds();
                if gap < self.config.velocity_interval_seconds {
                    min_gap = min_gap.min(gap);
                    flagged.push(pair[0].event_id.clone());
                    flagged.push(pair[1].event_id.clone());
                }
            }

            if !flagged.is_empty() {
                flagged.dedup();
                let severity = if min_gap < self.config.velocity_high_seconds {
                    Severity::High
                } else {
                    Severity::Medium
                };
                anomalies.push(Anomaly {
                    anomaly_type: AnomalyType::HighVelocity,
                    severity,
                    confidence: 0.8,
                    record_ids: flagged,
                    description: format!(
                        "subject {} made consecutive payments {}s apart",
                        subject, min_gap
                    ),
                    suggested_action: "Review the subject for automated or fraudulent use"
                        .to_string(),
                });
            }
        }

        anomalies
    }

    /// Informational concentration patterns, never alerting
    fn detect_patterns(&self, internal: &[PaymentRecord]) -> Vec<BehaviorPattern> {
        if internal.is_empty() {
            return Vec::new();
        }
        let total = internal.len() as f64;
        let mut patterns = Vec::new();

        let mut by_currency: HashMap<&str, usize> = HashMap::new();
        for record in internal {
            *by_currency.entry(record.currency.as_str()).or_default() += 1;
        }
        if let Some((currency, count)) = by_currency.into_iter().max_by_key(|(_, c)| *c) {
            let share = count as f64 / total;
            if share > self.config.currency_concentration_share {
                patterns.push(BehaviorPattern {
                    name: "dominant_currency".to_string(),
                    share,
                    description: format!(
                        "{:.0}% of the batch is denominated in {}",
                        share * 100.0,
                        currency
                    ),
                });
            }
        }

        let mut by_hour: HashMap<u32, usize> = HashMap::new();
        for record in internal {
            use chrono::Timelike;
            *by_hour.entry(record.created_at.hour()).or_default() += 1;
        }
        if let Some((hour, count)) = by_hour.into_iter().max_by_key(|(_, c)| *c) {
            let share = count as f64 / total;
            if share > self.config.peak_hour_share {
                patterns.push(BehaviorPattern {
                    name: "peak_hour".to_string(),
                    share,
                    description: format!(
                        "{:.0}% of the batch lands in hour {:02}:00 UTC",
                        share * 100.0,
                        hour
                    ),
                });
            }
        }

        patterns
    }
}

/// Nearest-rank percentile over a sorted slice
fn percentile(sorted: &[Decimal], q: f64) -> Decimal {
    if sorted.is_empty() {
        return Decimal::ZERO;
    }
    let rank = ((sorted.len() as f64) * q).ceil() as usize;
    let index = rank.saturating_sub(1).min(sorted.len() - 1);
    sorted[index]
}
