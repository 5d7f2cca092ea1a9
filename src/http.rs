//! Operational HTTP endpoints, served away from client traffic.
//!
//! Exposes `/metrics` for Prometheus scraping and `/healthz` for liveness
//! probes on a dedicated port.

use axum::{Router, http::StatusCode, routing::get};
use std::net::SocketAddr;
use tracing::{error, info};

async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

async fn healthz_handler() -> StatusCode {
    StatusCode::OK
}

/// Serve the operational endpoints on `0.0.0.0:port`. Long-running;
/// spawn it in the background. Bind or serve failures are logged, not
/// propagated, since losing metrics must not take the server down.
pub async fn run_http_server(port: u16) {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "Failed to bind operational HTTP server");
            return;
        }
    };
    info!(%addr, "Operational HTTP server listening");

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "Operational HTTP server error");
    }
}
