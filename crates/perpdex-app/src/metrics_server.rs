//! Prometheus scrape endpoint.

use crate::error::AppResult;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use perpdex_telemetry::Metrics;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub fn create_router() -> Router {
    Router::new().route("/metrics", get(render_metrics))
}

async fn render_metrics() -> Response {
    match Metrics::render() {
        Ok(body) => body.into_response(),
        Err(e) => {
            warn!(error = %e, "Metrics render failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Serve `/metrics` on `0.0.0.0:port` until `shutdown` fires.
pub async fn run_metrics_server(port: u16, shutdown: CancellationToken) -> AppResult<()> {
    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
    serve_metrics(listener, shutdown).await
}

/// Serve `/metrics` on an already bound listener until `shutdown` fires.
pub async fn serve_metrics(listener: TcpListener, shutdown: CancellationToken) -> AppResult<()> {
    info!(addr = %listener.local_addr()?, "Starting metrics server");
    axum::serve(listener, create_router())
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}
