//! Prometheus metrics endpoint
//!
//! Exposes gateway metrics in Prometheus format for monitoring.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::warn;

/// Global Prometheus handle, set once the recorder is installed
static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize metrics (call once at startup)
pub fn init_metrics() {
    let handle = PROMETHEUS_HANDLE.get_or_try_init(|| PrometheusBuilder::new().install_recorder());
    if let Err(e) = handle {
        warn!(error = %e, "Failed to install Prometheus recorder");
        return;
    }

    register_metrics();
}

/// Describe all gateway metrics
fn register_metrics() {
    metrics::describe_counter!(
        "gateway_requests_total",
        "Total number of chat completion requests processed"
    );
    metrics::describe_histogram!(
        "gateway_request_duration_seconds",
        "Time until the response (or first stream frame) was ready"
    );
    metrics::describe_counter!(
        "gateway_clients_started_total",
        "Backend clients started"
    );
    metrics::describe_gauge!(
        "gateway_active_sessions",
        "Number of live assistant sessions"
    );
    metrics::describe_counter!(
        "gateway_upstream_errors_total",
        "Classified upstream session errors"
    );
}

/// Prometheus metrics endpoint handler
///
/// Returns 404 when metrics are disabled or the recorder is not installed.
pub async fn prometheus_metrics() -> impl IntoResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, String::new()),
    }
}

/// Record a chat completion request
pub fn record_request(outcome: &str, model: &str, duration_secs: f64) {
    metrics::counter!(
        "gateway_requests_total",
        "outcome" => outcome.to_string(),
        "model" => model.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "model" => model.to_string())
        .record(duration_secs);
}

/// Record a backend client start
pub fn record_client_started() {
    metrics::counter!("gateway_clients_started_total").increment(1);
}

/// Track a session opening
pub fn session_opened() {
    metrics::gauge!("gateway_active_sessions").increment(1.0);
}

/// Track a session being released
pub fn session_closed() {
    metrics::gauge!("gateway_active_sessions").decrement(1.0);
}

/// Record a classified upstream error
pub fn record_upstream_error(status: StatusCode) {
    metrics::counter!("gateway_upstream_errors_total", "status" => status.as_u16().to_string())
        .increment(1);
}
