//! Single bucket shared by every caller.

use std::time::Duration;
use tracing::debug;

use super::backend::RateLimiterBackend;
use super::bucket::TokenBucket;
use super::decision::{format_rate, BackoffAdvice, Decision, Denial};
use super::registry::DEFAULT_SWEEP_INTERVAL;
use crate::error::Result;

/// A global token bucket that ignores the caller's identity.
#[derive(Debug)]
pub struct GlobalLimiter {
    bucket: TokenBucket,
    retry_after_secs: u64,
}

impl GlobalLimiter {
    /// Create a global limiter admitting `rate` requests per second with
    /// bursts of up to `burst`.
    pub fn new(rate: f64, burst: u32, retry_after_secs: u64) -> Result<Self> {
        Ok(Self {
            bucket: TokenBucket::new(rate, burst)?,
            retry_after_secs,
        })
    }
}

impl RateLimiterBackend for GlobalLimiter {
    fn check(&self, identifier: &str) -> Decision {
        if self.bucket.try_acquire() {
            return Decision::Allowed;
        }

        debug!(identifier = %identifier, "Global rate limit exceeded");
        Decision::Denied(Denial {
            limit: format_rate(self.bucket.rate()),
            advice: BackoffAdvice::RetryAfter(self.retry_after_secs),
            message: "Too many requests".to_string(),
        })
    }

    fn sweep(&self) -> usize {
        0
    }

    fn sweep_interval(&self) -> Duration {
        DEFAULT_SWEEP_INTERVAL
    }

    fn tracked(&self) -> usize {
        0
    }
}
