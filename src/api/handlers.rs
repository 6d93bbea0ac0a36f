//! HTTP API handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use time::OffsetDateTime;

use crate::bot::{BotStats, SharedStats};

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Whether the bot has registered and is trading.
    pub ready: Arc<AtomicBool>,
    /// Stats written by the bot loop.
    pub stats: SharedStats,
    /// Prometheus renderer, if a recorder was installed.
    pub prometheus: Option<PrometheusHandle>,
    /// Process start time.
    pub started_at: OffsetDateTime,
}

impl AppState {
    /// Create new app state.
    pub fn new() -> Self {
        Self::with_stats(SharedStats::default())
    }

    /// Create app state reading the given stats.
    pub fn with_stats(stats: SharedStats) -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
            stats,
            prometheus: None,
            started_at: OffsetDateTime::now_utc(),
        }
    }

    /// Attach a Prometheus handle for `/metrics`.
    pub fn with_prometheus(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.prometheus = handle;
        self
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether the bot is registered.
    pub ready: bool,
    /// Registered vendor name.
    pub vendor: Option<String>,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Service status.
    pub status: &'static str,
    /// Seconds since start.
    pub uptime_secs: i64,
    /// Last iteration time, RFC 3339.
    pub last_update: Option<String>,
    /// Loop statistics.
    pub stats: BotStats,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 if registered, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let is_ready = state.is_ready();
    let vendor = state.stats.read().await.vendor.clone();

    let response = ReadyResponse {
        ready: is_ready,
        vendor,
    };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Status handler - returns bot status and statistics.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.stats.read().await.clone();
    let status = if state.is_ready() { "running" } else { "starting" };
    let last_update = stats
        .updated_at
        .and_then(|t| t.format(&time::format_description::well_known::Rfc3339).ok());

    Json(StatusResponse {
        status,
        uptime_secs: (OffsetDateTime::now_utc() - state.started_at).whole_seconds(),
        last_update,
        stats,
    })
}

/// Prometheus scrape handler - 404 when no recorder is installed.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.prometheus {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::NOT_FOUND,
            "metrics recorder not installed".to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_state_ready_toggle() {
        let state = AppState::new();
        assert!(!state.is_ready());

        state.set_ready(true);
        assert!(state.is_ready());

        state.set_ready(false);
        assert!(!state.is_ready());
    }

    #[tokio::test]
    async fn state_shares_bot_stats() {
        let stats = SharedStats::default();
        let state = AppState::with_stats(stats.clone());
        stats.write().await.iterations = 4;
        assert_eq!(state.stats.read().await.iterations, 4);
    }
}
