//! Sleep abstraction for the polling loop.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

/// Suspends the bot between iterations.
#[async_trait]
pub trait Timer: Send + Sync {
    /// Sleep for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock timer backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

#[async_trait]
impl Timer for TokioTimer {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Timer that returns immediately and records every requested delay.
#[derive(Debug, Clone, Default)]
pub struct RecordingTimer {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingTimer {
    /// Create a new recording timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Timer for RecordingTimer {
    async fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
        tokio::task::yield_now().await;
    }
}
