//! Per-client token bucket registry.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::backend::RateLimiterBackend;
use super::bucket::{self, TokenBucket};
use super::decision::{format_rate, BackoffAdvice, Decision, Denial};
use crate::error::Result;

/// Default interval between registry sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Registry of independent token buckets, one per client identifier.
///
/// Buckets are created lazily on first use. Lookups of existing entries take
/// a shared lock on one shard of the map; creation, eviction and sweeps take
/// the shard exclusively, so a bucket is never created twice and never evicted
/// between lookup and consumption.
pub struct LimiterRegistry {
    /// Buckets indexed by client identifier
    entries: DashMap<String, Arc<TokenBucket>>,
    /// Refill rate for new buckets
    rate: f64,
    /// Capacity for new buckets
    burst: u32,
    /// Advisory `Retry-After` seconds for denied requests
    retry_after_secs: u64,
}

impl LimiterRegistry {
    /// Create an empty registry.
    ///
    /// Fails when `rate` is not a finite positive number or `burst` is zero.
    pub fn new(rate: f64, burst: u32) -> Result<Self> {
        bucket::validate(rate, burst)?;
        Ok(Self {
            entries: DashMap::new(),
            rate,
            burst,
            retry_after_secs: 1,
        })
    }

    /// Set the advisory `Retry-After` value reported on denial.
    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = secs;
        self
    }

    /// Return the bucket for `identifier`, creating it if absent.
    pub fn get_or_create(&self, identifier: &str) -> Arc<TokenBucket> {
        if let Some(existing) = self.entries.get(identifier) {
            return Arc::clone(existing.value());
        }

        let now = Instant::now();
        let entry = self
            .entries
            .entry(identifier.to_owned())
            .or_insert_with(|| self.new_bucket(identifier, now));
        Arc::clone(entry.value())
    }

    /// Consume one token from the bucket for `identifier`.
    pub fn admit(&self, identifier: &str) -> bool {
        self.admit_at(identifier, Instant::now())
    }

    /// Consume one token from the bucket for `identifier` as of `now`.
    pub fn admit_at(&self, identifier: &str, now: Instant) -> bool {
        // The shard guard is held while consuming so a sweep cannot detach
        // the bucket mid-call.
        if let Some(existing) = self.entries.get(identifier) {
            return existing.try_acquire_at(now);
        }

        let entry = self
            .entries
            .entry(identifier.to_owned())
            .or_insert_with(|| self.new_bucket(identifier, now));
        entry.try_acquire_at(now)
    }

    /// Remove every bucket that has refilled to capacity.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|identifier, bucket| {
            let keep = !bucket.is_full_at(now);
            if !keep {
                trace!(identifier = %identifier, "Evicting idle limiter");
            }
            keep
        });
        before.saturating_sub(self.entries.len())
    }

    /// Whether a bucket exists for `identifier`.
    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    /// Number of tracked identifiers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no identifier is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Refill rate applied to new buckets.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Capacity applied to new buckets.
    pub fn burst(&self) -> u32 {
        self.burst
    }

    fn new_bucket(&self, identifier: &str, now: Instant) -> Arc<TokenBucket> {
        debug!(
            identifier = %identifier,
            rate = self.rate,
            burst = self.burst,
            "Creating new token bucket"
        );
        Arc::new(TokenBucket::prevalidated(self.rate, self.burst, now))
    }
}

impl RateLimiterBackend for LimiterRegistry {
    fn check(&self, identifier: &str) -> Decision {
        if self.admit(identifier) {
            return Decision::Allowed;
        }

        debug!(identifier = %identifier, "Client rate limit exceeded");
        Decision::Denied(Denial {
            limit: format_rate(self.rate),
            advice: BackoffAdvice::RetryAfter(self.retry_after_secs),
            message: "Too many requests from your IP address".to_string(),
        })
    }

    fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_interval(&self) -> Duration {
        DEFAULT_SWEEP_INTERVAL
    }

    fn tracked(&self) -> usize {
        self.len()
    }
}
