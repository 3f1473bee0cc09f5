//! Rate limiting logic and state management.

mod clock;
mod limiter;
mod reset;
mod settings;

pub use clock::{Clock, ManualClock, SystemClock};
pub use limiter::{Decision, LimiterSnapshot, RateLimiter};
pub use reset::{ResetHandle, ResetTask};
pub use settings::{
    LimiterSettings, DEFAULT_BLOCK_DURATION, DEFAULT_MAX_REQUESTS, DEFAULT_RESET_INTERVAL,
};
