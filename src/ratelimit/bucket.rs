//! Token bucket primitive.

use parking_lot::Mutex;
use std::time::Instant;

use crate::error::{Result, TollgateError};

/// Highest accepted refill rate in permits per second.
pub const MAX_RATE: f64 = 1_000_000_000.0;

/// A continuously refilling token bucket.
///
/// The bucket holds up to `capacity` tokens and refills at `rate` tokens per
/// second. Each admitted request consumes one token. All state lives behind a
/// single lock, so concurrent callers observe updates in some serial order.
#[derive(Debug)]
pub struct TokenBucket {
    /// Tokens added per second
    rate: f64,
    /// Maximum number of tokens the bucket can hold
    capacity: f64,
    /// Fill level and the instant it was last brought up to date
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl BucketState {
    fn refill(&mut self, now: Instant, rate: f64, capacity: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }
}

impl TokenBucket {
    /// Create a full bucket.
    ///
    /// Fails when `rate` is not positive, exceeds [`MAX_RATE`], or `burst` is
    /// zero.
    pub fn new(rate: f64, burst: u32) -> Result<Self> {
        Self::new_at(rate, burst, Instant::now())
    }

    /// Create a full bucket whose refill clock starts at `now`.
    pub fn new_at(rate: f64, burst: u32, now: Instant) -> Result<Self> {
        validate(rate, burst)?;
        Ok(Self::prevalidated(rate, burst, now))
    }

    /// Create a full bucket from parameters that already passed `validate`.
    pub(crate) fn prevalidated(rate: f64, burst: u32, now: Instant) -> Self {
        let capacity = f64::from(burst);
        Self {
            rate,
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: now,
            }),
        }
    }

    /// Take one token if available. Never blocks waiting for a refill.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Take one token as of `now`.
    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock();
        state.refill(now, self.rate, self.capacity);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Current fill level.
    pub fn tokens_available(&self) -> f64 {
        self.tokens_available_at(Instant::now())
    }

    /// Fill level as of `now`.
    pub fn tokens_available_at(&self, now: Instant) -> f64 {
        let mut state = self.state.lock();
        state.refill(now, self.rate, self.capacity);
        state.tokens
    }

    /// Whether the bucket has refilled to capacity as of `now`.
    ///
    /// A full bucket carries no information a freshly created one would not,
    /// so it can be dropped without changing any future decision.
    pub fn is_full_at(&self, now: Instant) -> bool {
        self.tokens_available_at(now) >= self.capacity
    }

    /// Refill rate in tokens per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Maximum number of tokens.
    pub fn capacity(&self) -> u32 {
        self.capacity as u32
    }
}

/// Check token bucket parameters.
pub(crate) fn validate(rate: f64, burst: u32) -> Result<()> {
    if !rate.is_finite() || rate <= 0.0 || rate > MAX_RATE {
        return Err(TollgateError::InvalidLimit(format!(
            "rate must be a positive number of permits per second up to {}, got {}",
            MAX_RATE, rate
        )));
    }
    if burst == 0 {
        return Err(TollgateError::InvalidLimit(
            "burst must be at least 1".to_string(),
        ));
    }
    Ok(())
}
