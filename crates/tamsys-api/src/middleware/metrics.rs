//! # Prometheus Metrics
//!
//! Request metrics recorded through the `metrics` facade and exported by
//! `metrics-exporter-prometheus`.
//!
//! ## Counters
//! - `tamsys_http_requests_total`: requests by method, route, status
//! - `tamsys_gap_analyses_total`, `tamsys_bulk_records_created_total`,
//!   `tamsys_expiry_notifications_total`, `tamsys_records_expired_total`:
//!   recorded by the compliance engine
//!
//! ## Histograms
//! - `tamsys_http_request_duration_seconds`: request latency by method, route
//!
//! The recorder is process-global, so it is installed once in `main` and
//! the handle is carried in [`AppState`](crate::state::AppState). Without an
//! installed recorder the macros are no-ops.

use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::state::AppState;

/// Install the global Prometheus recorder.
pub fn install_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("failed to install metrics recorder: {e}"))
}

/// Middleware that counts requests and records their latency.
///
/// The route label is the matched route template (`/v1/devices/{id}`), so
/// ids never inflate label cardinality. Unmatched requests share one label.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    let elapsed = start.elapsed().as_secs_f64();
    counter!(
        "tamsys_http_requests_total",
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status
    )
    .increment(1);
    histogram!(
        "tamsys_http_request_duration_seconds",
        "method" => method,
        "route" => route
    )
    .record(elapsed);

    response
}

/// `GET /metrics`: Prometheus text exposition.
pub async fn render(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
