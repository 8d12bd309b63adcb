/// Metrics and telemetry for Lectern
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Access decisions and recorded access events
/// - Invoice transitions
/// - Enrollments and chapter cascade failures

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder, HistogramVec,
    IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "lectern_http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "lectern_http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .unwrap();

    // ========== Access Metrics ==========

    /// Access decisions by outcome (allowed, view_limit, device_limit, both_limits)
    pub static ref ACCESS_DECISIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "lectern_access_decisions_total",
        "Content access decisions by outcome",
        &["result"]
    )
    .unwrap();

    /// Access events by write status (recorded, dropped)
    pub static ref ACCESS_EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "lectern_access_events_total",
        "Access events by write status",
        &["status"]
    )
    .unwrap();

    // ========== Billing Metrics ==========

    /// Invoices created by item type
    pub static ref INVOICES_CREATED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "lectern_invoices_created_total",
        "Invoices created by item type",
        &["item_type"]
    )
    .unwrap();

    /// Invoice status transitions by target status
    pub static ref INVOICE_TRANSITIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "lectern_invoice_transitions_total",
        "Invoice status transitions by target status",
        &["status"]
    )
    .unwrap();

    // ========== Enrollment Metrics ==========

    /// Enrollment attempts by source and outcome
    pub static ref ENROLLMENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "lectern_enrollments_total",
        "Enrollment attempts by source and outcome",
        &["source", "outcome"]
    )
    .unwrap();

    /// Member courses that failed during a chapter cascade
    pub static ref CASCADE_FAILURES_TOTAL: IntCounter = register_int_counter!(
        "lectern_cascade_failures_total",
        "Chapter member courses that failed to enroll"
    )
    .unwrap();

    // ========== Error Metrics ==========

    /// Errors by type and module
    pub static ref ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "lectern_errors_total",
        "Total number of errors",
        &["error_type", "module"]
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration);
}

/// Record an access decision
pub fn record_access_decision(result: &str) {
    ACCESS_DECISIONS_TOTAL.with_label_values(&[result]).inc();
}

/// Record an access event write
pub fn record_access_event(status: &str) {
    ACCESS_EVENTS_TOTAL.with_label_values(&[status]).inc();
}

/// Record a newly created invoice
pub fn record_invoice_created(item_type: &str) {
    INVOICES_CREATED_TOTAL.with_label_values(&[item_type]).inc();
}

/// Record an invoice status transition
pub fn record_invoice_transition(status: &str) {
    INVOICE_TRANSITIONS_TOTAL.with_label_values(&[status]).inc();
}

/// Record an enrollment attempt
pub fn record_enrollment(source: &str, outcome: &str) {
    ENROLLMENTS_TOTAL.with_label_values(&[source, outcome]).inc();
}

/// Record a failed member course in a chapter cascade
pub fn record_cascade_failure() {
    CASCADE_FAILURES_TOTAL.inc();
}

/// Record an error
pub fn record_error(error_type: &str, module: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type, module]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/health", 200, 0.002);
        let metrics = render_metrics();
        assert!(metrics.contains("lectern_http_requests_total"));
        assert!(metrics.contains("lectern_http_request_duration_seconds"));
    }

    #[test]
    fn test_record_access_metrics() {
        record_access_decision("allowed");
        record_access_decision("view_limit");
        record_access_event("recorded");
        let metrics = render_metrics();
        assert!(metrics.contains("lectern_access_decisions_total"));
        assert!(metrics.contains("lectern_access_events_total"));
    }

    #[test]
    fn test_record_enrollment_metrics() {
        record_enrollment("invoice", "enrolled");
        record_cascade_failure();
        record_invoice_transition("paid");
        record_invoice_created("course");
        let metrics = render_metrics();
        assert!(metrics.contains("lectern_invoices_created_total"));
        assert!(metrics.contains("lectern_enrollments_total"));
        assert!(metrics.contains("lectern_cascade_failures_total"));
        assert!(metrics.contains("lectern_invoice_transitions_total"));
    }

    #[test]
    fn test_metrics_rendering() {
        record_error("NotFound", "billing");
        let metrics = render_metrics();

        assert!(metrics.contains("# HELP"));
        assert!(metrics.contains("# TYPE"));
        assert!(metrics.contains("lectern_errors_total"));
    }
}
