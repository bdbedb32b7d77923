//! Reconciliation metrics

use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec,
};

lazy_static::lazy_static! {
    pub static ref RECON_SESSIONS_TOTAL: CounterVec = register_counter_vec!(
        "recon_sessions_total",
        "Reconciliation sessions by terminal status",
        &["session_type", "status"]
    )
    .unwrap();

    pub static ref RECON_SESSION_DURATION: HistogramVec = register_histogram_vec!(
        "recon_session_duration_seconds",
        "Reconciliation session duration",
        &["session_type"]
    )
    .unwrap();

    pub static ref DISCREPANCIES_TOTAL: CounterVec = register_counter_vec!(
        "recon_discrepancies_total",
        "Discrepancies found, by type and severity",
        &["type", "severity"]
    )
    .unwrap();

    pub static ref ANOMALIES_TOTAL: CounterVec = register_counter_vec!(
        "recon_anomalies_total",
        "Anomalies detected, by type and severity",
        &["type", "severity"]
    )
    .unwrap();
}
