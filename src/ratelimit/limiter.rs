//! Core rate limiter implementation.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::clock::{add_saturating, Clock, SystemClock};
use super::settings::LimiterSettings;

/// Outcome of evaluating a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    /// The request may proceed.
    Admit,
    /// The request must be short-circuited.
    Reject,
}

impl Decision {
    /// Whether this decision lets the request through.
    pub fn is_admit(&self) -> bool {
        matches!(self, Decision::Admit)
    }
}

/// Point-in-time view of the limiter state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimiterSnapshot {
    /// Identities with a request count in the current window
    pub tracked_identities: usize,
    /// Identities whose block has not yet expired
    pub active_blocks: usize,
    /// Unrestricted-to-blocked transitions since startup
    pub blocks_issued: u64,
    /// Admitted requests allowed per identity per window
    pub max_requests_per_window: u64,
}

/// Per-identity request counter with a temporary block penalty.
///
/// Each identity may make `max_requests_per_window` requests between two
/// calls to [`reset`](Self::reset). The next request blocks the identity
/// for `block_duration`; while blocked every request is rejected without
/// being counted. Blocks expire lazily and are never removed, only
/// overwritten by a later violation.
///
/// This struct is thread-safe and can be shared across multiple tasks.
pub struct RateLimiter {
    /// Requests seen per identity since the last reset
    counts: DashMap<String, AtomicU64>,
    /// Absolute time each blocked identity is released
    blocks: DashMap<String, DateTime<Utc>>,
    /// Number of unrestricted-to-blocked transitions
    blocks_issued: AtomicU64,
    settings: LimiterSettings,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a new rate limiter reading the system clock.
    pub fn new(settings: LimiterSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    /// Create a new rate limiter reading time from `clock`.
    pub fn with_clock(settings: LimiterSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            counts: DashMap::new(),
            blocks: DashMap::new(),
            blocks_issued: AtomicU64::new(0),
            settings,
            clock,
        }
    }

    /// Decide whether a request from `identity` is admitted.
    ///
    /// Never fails: unknown identities start unrestricted with a count of
    /// zero, and any string (including the empty one) is a valid key.
    pub fn evaluate(&self, identity: &str) -> Decision {
        let now = self.clock.now();

        if let Some(until) = self.live_block(identity, now) {
            debug!(
                identity = %identity,
                blocked_until = %until,
                "Rejecting blocked identity"
            );
            return Decision::Reject;
        }

        let count = self.increment(identity);

        trace!(identity = %identity, count = count, "Counted request");

        if count > self.settings.max_requests_per_window {
            self.block(identity, count, now);
            return Decision::Reject;
        }

        Decision::Admit
    }

    /// Clear every request count.
    ///
    /// Blocks are untouched, so an identity serving a penalty stays
    /// blocked across the reset. Increments racing with the clear may be
    /// lost, restarting that identity at one.
    pub fn reset(&self) {
        let cleared = self.counts.len();
        self.counts.clear();
        debug!(cleared = cleared, "Reset request counters");
    }

    /// Get the current count for an identity.
    ///
    /// Returns `None` if the identity has not been counted since the last reset.
    pub fn request_count(&self, identity: &str) -> Option<u64> {
        self.counts
            .get(identity)
            .map(|count| count.load(Ordering::SeqCst))
    }

    /// Get the release time of a live block on `identity`.
    pub fn blocked_until(&self, identity: &str) -> Option<DateTime<Utc>> {
        self.live_block(identity, self.clock.now())
    }

    /// Get the remaining time of a live block on `identity`.
    pub fn retry_after(&self, identity: &str) -> Option<Duration> {
        let now = self.clock.now();
        let until = self.live_block(identity, now)?;
        (until - now).to_std().ok()
    }

    /// Get the number of identities counted since the last reset.
    pub fn tracked_identities(&self) -> usize {
        self.counts.len()
    }

    /// Get the number of identities currently blocked.
    pub fn active_blocks(&self) -> usize {
        let now = self.clock.now();
        self.blocks.iter().filter(|entry| *entry.value() > now).count()
    }

    /// Get the number of unrestricted-to-blocked transitions so far.
    pub fn blocks_issued(&self) -> u64 {
        self.blocks_issued.load(Ordering::SeqCst)
    }

    /// Get the settings this limiter enforces.
    pub fn settings(&self) -> &LimiterSettings {
        &self.settings
    }

    /// Take a snapshot of the limiter state.
    pub fn snapshot(&self) -> LimiterSnapshot {
        LimiterSnapshot {
            tracked_identities: self.tracked_identities(),
            active_blocks: self.active_blocks(),
            blocks_issued: self.blocks_issued(),
            max_requests_per_window: self.settings.max_requests_per_window,
        }
    }

    fn live_block(&self, identity: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.blocks
            .get(identity)
            .map(|until| *until)
            .filter(|until| *until > now)
    }

    /// Add one to the identity's count and return the new value.
    ///
    /// The fetch-add is the only step that decides the count, so exactly
    /// one concurrent caller observes `max + 1`.
    fn increment(&self, identity: &str) -> u64 {
        if let Some(count) = self.counts.get(identity) {
            return count.fetch_add(1, Ordering::SeqCst) + 1;
        }

        self.counts
            .entry(identity.to_owned())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::SeqCst)
            + 1
    }

    fn block(&self, identity: &str, count: u64, now: DateTime<Utc>) {
        let until = add_saturating(now, self.settings.block_duration);
        let previous = self.blocks.insert(identity.to_owned(), until);

        match previous {
            Some(previous) if previous > now => {
                debug!(
                    identity = %identity,
                    count = count,
                    blocked_until = %until,
                    "Extended block"
                );
            }
            _ => {
                self.blocks_issued.fetch_add(1, Ordering::SeqCst);
                warn!(
                    identity = %identity,
                    count = count,
                    limit = self.settings.max_requests_per_window,
                    blocked_until = %until,
                    "Rate limit exceeded, blocking identity"
                );
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(LimiterSettings::default())
    }
}
