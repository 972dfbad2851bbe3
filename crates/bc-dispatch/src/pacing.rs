//! Pacing controller - a single shared permit stream for all workers
//!
//! One permit per interval, no bursts, so total attempt throughput stays under
//! the provider's global ceiling regardless of worker count.

use governor::{Quota, RateLimiter, state::{NotKeyed, InMemoryState}, clock::DefaultClock};
use std::time::Duration;
use tracing::debug;

use crate::error::DispatchError;

pub struct PacingController {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    interval: Duration,
}

impl PacingController {
    /// Create a controller issuing one permit every `interval`
    pub fn new(interval: Duration) -> Result<Self, DispatchError> {
        let quota = Quota::with_period(interval).ok_or(DispatchError::InvalidPacing(interval))?;
        debug!(interval_ms = interval.as_millis() as u64, "Pacing controller created");
        Ok(Self {
            limiter: RateLimiter::direct(quota),
            interval,
        })
    }

    /// Wait until the next permit is available
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    /// Take a permit only if one is available right now
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
