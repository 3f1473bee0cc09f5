//! Ownership of the limiter and its reset schedule.

use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::ratelimit::{Clock, LimiterSettings, RateLimiter, ResetHandle, ResetTask, SystemClock};

/// A running rate limiter together with the task that resets it.
///
/// Construct one at startup and hand [`limiter`](Self::limiter) to whatever
/// serves requests. Call [`shutdown`](Self::shutdown) to stop the reset
/// schedule.
pub struct RateLimitGuard {
    limiter: Arc<RateLimiter>,
    reset: ResetHandle,
}

impl RateLimitGuard {
    /// Validate `settings`, build the limiter, and start its reset task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(settings: LimiterSettings) -> Result<Self> {
        Self::start_with_clock(settings, Arc::new(SystemClock))
    }

    /// Same as [`start`](Self::start) with an explicit time source.
    pub fn start_with_clock(settings: LimiterSettings, clock: Arc<dyn Clock>) -> Result<Self> {
        settings.validate()?;

        info!(
            max_requests_per_window = settings.max_requests_per_window,
            block_duration_ms = settings.block_duration.as_millis() as u64,
            reset_interval_ms = settings.reset_interval.as_millis() as u64,
            "Starting rate limiter"
        );

        let reset_interval = settings.reset_interval;
        let limiter = Arc::new(RateLimiter::with_clock(settings, clock));
        let reset = ResetTask::spawn(limiter.clone(), reset_interval);

        Ok(Self { limiter, reset })
    }

    /// Get a shared handle to the limiter.
    pub fn limiter(&self) -> Arc<RateLimiter> {
        self.limiter.clone()
    }

    /// Stop the reset task and wait for it to exit.
    pub async fn shutdown(self) {
        self.reset.shutdown().await;
        info!("Rate limiter stopped");
    }
}
