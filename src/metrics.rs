//! Prometheus metrics collection for alidns-sync
//!
//! This module provides metrics collection for monitoring the agent's cycles.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram, register_histogram_vec,
    CounterVec, Gauge, Histogram, HistogramVec,
};

//==============================================================================
// Metrics
//==============================================================================

lazy_static! {
    /// Total number of reconciliation cycles by outcome
    pub static ref CYCLES_TOTAL: CounterVec = register_counter_vec!(
        "alidns_sync_cycles_total",
        "Total number of reconciliation cycles",
        &["outcome"]
    )
    .unwrap();

    /// Total number of records changed on the provider
    pub static ref RECORD_CHANGES_TOTAL: CounterVec = register_counter_vec!(
        "alidns_sync_record_changes_total",
        "Total number of DNS records updated or added",
        &["operation"]
    )
    .unwrap();

    /// Total number of cycle errors by kind
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "alidns_sync_errors_total",
        "Total number of failed cycles",
        &["error_type"]
    )
    .unwrap();

    /// Current error count (consecutive failed cycles)
    pub static ref ERROR_COUNT: Gauge = register_gauge!(
        "alidns_sync_error_count",
        "Current number of consecutive failed cycles"
    )
    .unwrap();

    /// Unix timestamp of the last successful cycle
    pub static ref LAST_SYNC_TIMESTAMP: Gauge = register_gauge!(
        "alidns_sync_last_sync_timestamp_seconds",
        "Unix timestamp of the last successful cycle"
    )
    .unwrap();

    /// Current sync state (0=Unknown, 1=Synced, 2=Error)
    pub static ref SYNC_STATE: Gauge = register_gauge!(
        "alidns_sync_sync_state",
        "Current sync state (0=Unknown, 1=Synced, 2=Error)"
    )
    .unwrap();

    /// Cycle duration histogram
    pub static ref CYCLE_DURATION_SECONDS: Histogram = register_histogram!(
        "alidns_sync_cycle_duration_seconds",
        "Reconciliation cycle duration in seconds",
        vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0]
    )
    .unwrap();

    /// DNS API call duration histogram
    pub static ref API_CALL_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "alidns_sync_api_call_duration_seconds",
        "DNS API call duration in seconds",
        &["action"]
    )
    .unwrap();
}

//==============================================================================
// Public Functions
//==============================================================================

/// Records the end of a cycle
///
/// # Arguments
///
/// * `outcome` - "synced", "skipped" or "failed"
pub fn record_cycle(outcome: &str) {
    CYCLES_TOTAL.with_label_values(&[outcome]).inc();
}

/// Records one record change confirmed by the provider
///
/// # Arguments
///
/// * `operation` - "update" or "add"
pub fn record_change(operation: &str) {
    RECORD_CHANGES_TOTAL.with_label_values(&[operation]).inc();
}

/// Records a failed cycle
///
/// # Arguments
///
/// * `error_type` - Error kind (e.g., "network", "upstream")
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Sets the current error count
pub fn set_error_count(count: u64) {
    ERROR_COUNT.set(count as f64);
}

/// Sets the timestamp of the last successful cycle
pub fn set_last_sync(unix_seconds: f64) {
    LAST_SYNC_TIMESTAMP.set(unix_seconds);
}

/// Sets the current sync state
///
/// # Arguments
///
/// * `state` - Sync state (0=Unknown, 1=Synced, 2=Error)
pub fn set_sync_state(state: u64) {
    SYNC_STATE.set(state as f64);
}

/// Starts a timer for a whole cycle
pub fn start_cycle_timer() -> HistogramTimer {
    CYCLE_DURATION_SECONDS.start_timer()
}

/// Starts a timer for one DNS API call
///
/// # Arguments
///
/// * `action` - RPC action name (e.g., "DescribeDomainRecords")
pub fn start_api_timer(action: &str) -> HistogramTimer {
    API_CALL_DURATION_SECONDS
        .with_label_values(&[action])
        .start_timer()
}

/// Collects all metrics and returns them as text
///
/// # Returns
///
/// Returns the metrics in Prometheus text format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# metrics encoding failed: {e}\n");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

//==============================================================================
// Types
//==============================================================================

/// Histogram timer for measuring duration
pub type HistogramTimer = prometheus::HistogramTimer;

//==============================================================================
// Tests
//==============================================================================
