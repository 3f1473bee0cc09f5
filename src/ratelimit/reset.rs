//! Periodic reset of the request counters.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use super::limiter::RateLimiter;

/// Background task that clears a limiter's counters on a fixed schedule.
pub struct ResetTask;

impl ResetTask {
    /// Spawn the reset loop on the current tokio runtime.
    ///
    /// The first reset happens one full `interval` after spawning. The
    /// loop runs until [`ResetHandle::shutdown`] is called or the handle
    /// is dropped.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero or if called outside a tokio runtime.
    pub fn spawn(limiter: Arc<RateLimiter>, interval: Duration) -> ResetHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(interval_ms = interval.as_millis() as u64, "Counter reset task started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => limiter.reset(),
                    _ = &mut shutdown_rx => break,
                }
            }

            debug!("Counter reset task stopped");
        });

        ResetHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

/// Handle to a running [`ResetTask`].
pub struct ResetHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ResetHandle {
    /// Signal the reset loop to stop and wait for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "Counter reset task failed");
            }
        }
    }

    /// Whether the reset loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }
}

impl Drop for ResetHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}
