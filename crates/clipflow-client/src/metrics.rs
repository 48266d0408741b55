//! Request metrics.
//!
//! Recorded through the `metrics` facade; installing a recorder is left to
//! the embedding application.

use metrics::{counter, histogram};

/// Metric name constants.
pub mod names {
    /// Total API requests by operation and status.
    pub const REQUESTS_TOTAL: &str = "clipflow_requests_total";

    /// Request latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "clipflow_request_latency_seconds";

    /// Bytes written by artifact downloads.
    pub const DOWNLOAD_BYTES_TOTAL: &str = "clipflow_download_bytes_total";
}

/// Record metrics for a completed API request.
///
/// `status` is the HTTP status, or 0 when no response was received.
pub fn record_request(operation: &str, status: u16, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "operation" => operation.to_string()
    )
    .record(latency_ms / 1000.0);
}

pub fn record_download(kind: &str, bytes: u64) {
    counter!(names::DOWNLOAD_BYTES_TOTAL, "kind" => kind.to_string()).increment(bytes);
}
