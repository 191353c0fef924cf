//! Firestore client metrics.

use metrics::{counter, histogram};

pub const REQUESTS_TOTAL: &str = "navsight_firestore_requests_total";
pub const RETRIES_TOTAL: &str = "navsight_firestore_retries_total";
pub const LATENCY_SECONDS: &str = "navsight_firestore_latency_seconds";
/// Transition writes that lost an updateTime race and were re-read.
pub const PRECONDITION_CONFLICTS_TOTAL: &str = "navsight_firestore_precondition_conflicts_total";

pub fn record_request(operation: &str, status: u16, latency_ms: f64) {
    let op = operation.to_string();
    counter!(REQUESTS_TOTAL, "operation" => op.clone(), "status" => status.to_string()).increment(1);
    histogram!(LATENCY_SECONDS, "operation" => op).record(latency_ms / 1000.0);
}

pub fn record_retry(operation: &str) {
    counter!(RETRIES_TOTAL, "operation" => operation.to_string()).increment(1);
}

pub fn record_precondition_conflict(operation: &str) {
    counter!(PRECONDITION_CONFLICTS_TOTAL, "operation" => operation.to_string()).increment(1);
}
