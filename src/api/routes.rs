//! HTTP API route definitions.

use std::net::SocketAddr;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use super::handlers::{health, metrics, ready, status, AppState};
use crate::utils::shutdown_signal;

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Status endpoint
        .route("/api/v1/status", get(status))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve the API on a background task until a shutdown signal.
///
/// Returns the bound address, which differs from `addr` when port 0 is given.
pub async fn serve(
    state: AppState,
    addr: SocketAddr,
) -> crate::Result<(SocketAddr, JoinHandle<std::io::Result<()>>)> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    let router = create_router(state);

    let handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    Ok((local_addr, handle))
}
