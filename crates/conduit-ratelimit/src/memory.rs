use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DashMapStateStore;
use governor::{Quota, RateLimiter};

use crate::error::RateLimitError;

type KeyedLimiter = RateLimiter<String, DashMapStateStore<String>, DefaultClock>;

/// Keyed in-memory limiter backed by governor
#[derive(Clone)]
pub struct MemoryLimiter {
    limiter: Arc<KeyedLimiter>,
    clock: DefaultClock,
}

impl MemoryLimiter {
    /// Allow `max_requests` per `window` per key, replenished evenly
    pub fn new(max_requests: u32, window: Duration) -> Result<Self, RateLimitError> {
        if window.is_zero() {
            return Err(RateLimitError::Config("rate limit window must be > 0".to_owned()));
        }
        let burst =
            NonZeroU32::new(max_requests).ok_or_else(|| RateLimitError::Config("requests must be > 0".to_owned()))?;

        let quota = Quota::with_period(window / burst.get())
            .ok_or_else(|| RateLimitError::Config("invalid rate limit period".to_owned()))?
            .allow_burst(burst);

        Ok(Self {
            limiter: Arc::new(RateLimiter::dashmap(quota)),
            clock: DefaultClock::default(),
        })
    }

    /// Take one request from the key's quota
    pub fn check(&self, key: &str) -> Result<(), RateLimitError> {
        self.limiter.check_key(&key.to_owned()).map_err(|not_until| {
            let wait = not_until.wait_time_from(self.clock.now());
            RateLimitError::Exceeded {
                retry_after: wait.as_secs().max(1),
            }
        })
    }

    /// Drop idle keys
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
    }
}
