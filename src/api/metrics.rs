//! Prometheus metrics endpoint.

use axum::{extract::State, http::header, response::IntoResponse};

use crate::error::Result;
use crate::metrics::{self, ConnectionMetrics};
use crate::server::AppState;

/// GET /metrics - Prometheus metrics endpoint
pub async fn prometheus_metrics(State(state): State<AppState>) -> Result<impl IntoResponse> {
    // Listeners update the gauges asynchronously; resync before scraping
    ConnectionMetrics::set_index(state.registry.stats());

    let output = metrics::encode_metrics()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        output,
    ))
}
