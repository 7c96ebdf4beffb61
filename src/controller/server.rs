//! HTTP server for health probes and Prometheus metrics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus::TextEncoder;
use tracing::info;

use crate::observability::metrics;

/// Shared state between the server and the controller runtime.
pub struct ServerState {
    /// Set once the listener is bound; drives the readiness probe.
    pub is_ready: Arc<AtomicBool>,
}

/// Bind and serve `/healthz`, `/readyz` and `/metrics`.
pub async fn start_server(port: u16, state: Arc<ServerState>) -> Result<()> {
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind metrics server to port {port}"))?;
    info!("Metrics and probe server listening on port {}", port);
    state.is_ready.store(true, Ordering::Relaxed);

    axum::serve(listener, app).await.context("HTTP server failed")
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn readyz(State(state): State<Arc<ServerState>>) -> StatusCode {
    if state.is_ready.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    encoder
        .encode_to_string(&metrics::registry().gather())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
