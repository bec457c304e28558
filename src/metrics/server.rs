// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! # HTTP Server
//!
//! Provides endpoints:
//! - `/` - Index page linking the others
//! - `/metrics` - Prometheus metrics in text format
//! - `/healthz` - Liveness probe (always returns 200)
//! - `/version` - Build information as JSON

use crate::constants::METRICS_REQUEST_TIMEOUT;
use crate::error::{PushError, Result};
use crate::metrics::PrometheusMetrics;
use crate::version;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;
use tracing::{error, info};

const INDEX_PAGE: &str = r#"<html>
<head><title>push-to-k8s</title></head>
<body>
<h1>push-to-k8s</h1>
<p><a href="/metrics">Metrics</a></p>
<p><a href="/healthz">Health</a></p>
<p><a href="/version">Version</a></p>
</body>
</html>"#;

pub fn router(metrics: Arc<PrometheusMetrics>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/version", get(version_handler))
        .layer(request_timeout())
        .with_state(metrics)
}

// Slow or stalled clients get a 408 instead of holding the handler
fn request_timeout() -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, METRICS_REQUEST_TIMEOUT)
}

/// Serve metrics and probes until `shutdown` is cancelled
pub async fn start_server(
    port: u16,
    metrics: Arc<PrometheusMetrics>,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| PushError::Server(format!("Failed to bind {}: {}", addr, e)))?;

    info!("Starting Prometheus metrics server at {}", addr);

    axum::serve(listener, router(metrics))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| PushError::Server(e.to_string()))?;

    info!("Metrics server stopped");
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

async fn metrics_handler(State(metrics): State<Arc<PrometheusMetrics>>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

async fn healthz_handler() -> &'static str {
    "OK"
}

async fn version_handler() -> Json<version::VersionInfo> {
    Json(version::info())
}
