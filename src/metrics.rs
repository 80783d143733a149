/// Metrics and telemetry for Repute
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Sync stage outcomes and imported reviews
/// - OAuth token refreshes

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use lazy_static::lazy_static;
use prometheus::{
    register_gauge, register_histogram_vec, register_int_counter_vec, Encoder, Gauge,
    HistogramVec, IntCounterVec, TextEncoder,
};
use std::time::Instant;

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, route, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap();

    // ========== Sync Metrics ==========

    /// Outcome of every stage the orchestrator evaluated
    pub static ref SYNC_STAGE_OUTCOMES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "sync_stage_outcomes_total",
        "Sync stage outcomes by stage and outcome",
        &["stage", "outcome"]
    )
    .unwrap();

    /// Rows newly written by sync
    pub static ref REVIEWS_IMPORTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "reviews_imported_total",
        "Reviews inserted by sync, by platform and producing stage",
        &["platform", "source"]
    )
    .unwrap();

    /// OAuth refresh attempts
    pub static ref TOKEN_REFRESHES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "token_refreshes_total",
        "OAuth access token refreshes by result",
        &["result"]
    )
    .unwrap();

    // ========== System Metrics ==========

    /// Application uptime in seconds
    pub static ref UPTIME_SECONDS: Gauge = register_gauge!(
        "uptime_seconds",
        "Application uptime in seconds"
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
    }
    String::from_utf8_lossy(&buffer).into_owned()
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

/// Record the outcome of one sync stage
pub fn record_sync_stage(stage: &str, outcome: &str) {
    SYNC_STAGE_OUTCOMES_TOTAL
        .with_label_values(&[stage, outcome])
        .inc();
}

/// Record rows written by a sync
pub fn record_reviews_imported(platform: &str, source: &str, inserted: u64) {
    REVIEWS_IMPORTED_TOTAL
        .with_label_values(&[platform, source])
        .inc_by(inserted);
}

/// Record a token refresh attempt
pub fn record_token_refresh(success: bool) {
    let result = if success { "success" } else { "failure" };
    TOKEN_REFRESHES_TOTAL.with_label_values(&[result]).inc();
}

/// Middleware recording request counts and latencies by matched route
pub async fn track_http(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}
