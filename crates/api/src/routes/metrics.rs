//! Prometheus metrics endpoint.
//!
//! Counters and histograms are recorded throughout the checkout flow
//! (`checkout_total`, `checkout_failed_total`,
//! `checkout_duration_seconds`, `payments_confirmed_total`,
//! `low_stock_alerts_total`) and rendered here.

use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

/// GET /metrics — renders the Prometheus exposition format.
pub async fn get(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        handle.render(),
    )
}
