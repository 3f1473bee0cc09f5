//! Limits enforced by the rate limiter.

use std::time::Duration;

use crate::error::{GuardError, Result};

/// Default number of admitted requests per identity per window.
pub const DEFAULT_MAX_REQUESTS: u64 = 60;
/// Default block penalty once the threshold is crossed.
pub const DEFAULT_BLOCK_DURATION: Duration = Duration::from_millis(600_000);
/// Default interval between bulk counter resets.
pub const DEFAULT_RESET_INTERVAL: Duration = Duration::from_millis(60_000);

/// Settings for a [`RateLimiter`](super::RateLimiter) and its reset task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterSettings {
    /// Maximum admitted requests per identity between two resets
    pub max_requests_per_window: u64,
    /// Time an identity stays blocked after crossing the threshold
    pub block_duration: Duration,
    /// Interval between bulk resets of the request counters
    pub reset_interval: Duration,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            max_requests_per_window: DEFAULT_MAX_REQUESTS,
            block_duration: DEFAULT_BLOCK_DURATION,
            reset_interval: DEFAULT_RESET_INTERVAL,
        }
    }
}

impl LimiterSettings {
    /// Reject settings the limiter cannot enforce meaningfully.
    ///
    /// The block must last at least two reset intervals. Resets run on a
    /// ticker that may fire late while the block is measured on the wall
    /// clock, so one interval of slack guarantees a full reset lands inside
    /// every block and the identity is released into a fresh window.
    pub fn validate(&self) -> Result<()> {
        if self.max_requests_per_window == 0 {
            return Err(GuardError::Config(
                "max_requests_per_window must be greater than zero".to_string(),
            ));
        }
        if self.reset_interval.is_zero() {
            return Err(GuardError::Config(
                "reset_interval must be greater than zero".to_string(),
            ));
        }
        if self.block_duration < self.reset_interval.saturating_mul(2) {
            return Err(GuardError::Config(format!(
                "block_duration ({:?}) must be at least twice reset_interval ({:?})",
                self.block_duration, self.reset_interval
            )));
        }
        Ok(())
    }
}
