//! Token-bucket rate limiting
//!
//! The bucket starts full. One token is added per elapsed `refill_interval`,
//! up to `capacity`. Refill is computed lazily on each call from the number of
//! whole intervals elapsed, so no background task is needed.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Result, ServiceError};

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterConfig {
    pub capacity: u32,
    pub refill_interval: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            refill_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct TokenBucket {
    name: String,
    config: RateLimiterConfig,
    bucket: Mutex<Bucket>,
}

impl TokenBucket {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self::named("default", config)
    }

    pub fn named(name: impl Into<String>, config: RateLimiterConfig) -> Self {
        let config = RateLimiterConfig {
            capacity: config.capacity.max(1),
            refill_interval: config.refill_interval.max(Duration::from_millis(1)),
        };
        Self {
            name: name.into(),
            bucket: Mutex::new(Bucket {
                tokens: config.capacity,
                last_refill: Instant::now(),
            }),
            config,
        }
    }

    fn refilled(&self) -> MutexGuard<'_, Bucket> {
        let mut bucket = self.bucket.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let interval = self.config.refill_interval;
        let elapsed = bucket.last_refill.elapsed();
        let whole = (elapsed.as_nanos() / interval.as_nanos()) as u64;
        if whole > 0 {
            let added = whole.min(u64::from(self.config.capacity)) as u32;
            bucket.tokens = bucket.tokens.saturating_add(added).min(self.config.capacity);
            // Keep the fractional remainder so partial intervals are not lost.
            bucket.last_refill += interval * whole.min(u64::from(u32::MAX)) as u32;
            if bucket.tokens == self.config.capacity {
                bucket.last_refill = Instant::now();
            }
        }
        bucket
    }

    /// Take one token or fail immediately with `ServiceError::RateLimited`.
    pub fn try_acquire(&self) -> Result<()> {
        let mut bucket = self.refilled();
        if bucket.tokens == 0 {
            log::debug!("Rate limiter '{}' rejected call: bucket empty", self.name);
            return Err(ServiceError::rate_limited(format!(
                "'{}' exceeded {} calls per {:?} window",
                self.name, self.config.capacity, self.config.refill_interval
            )));
        }
        bucket.tokens -= 1;
        Ok(())
    }

    pub fn available_tokens(&self) -> u32 {
        self.refilled().tokens
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }
}
