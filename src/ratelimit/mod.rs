//! Rate limiting logic and state management.

mod backend;
mod bucket;
mod decision;
mod global;
mod registry;
mod sweeper;
mod window;

pub use backend::RateLimiterBackend;
pub use bucket::{TokenBucket, MAX_RATE};
pub use decision::{format_rate, format_window, BackoffAdvice, Decision, Denial};
pub use global::GlobalLimiter;
pub use registry::{LimiterRegistry, DEFAULT_SWEEP_INTERVAL};
pub use sweeper::Sweeper;
pub use window::{WindowLimiter, MAX_WINDOW};

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{RateLimitingConfig, Strategy};
use crate::error::Result;

/// Build the configured admission strategy.
pub fn build_backend(config: &RateLimitingConfig) -> Result<Arc<dyn RateLimiterBackend>> {
    config.validate()?;

    let backend: Arc<dyn RateLimiterBackend> = match config.strategy {
        Strategy::Global => Arc::new(GlobalLimiter::new(
            config.rate,
            config.burst,
            config.retry_after_secs,
        )?),
        Strategy::PerClient => Arc::new(
            LimiterRegistry::new(config.rate, config.burst)?
                .with_retry_after(config.retry_after_secs),
        ),
        Strategy::SlidingWindow => Arc::new(WindowLimiter::new(config.limit, config.window())?),
    };

    info!(
        strategy = ?config.strategy,
        rate = config.rate,
        burst = config.burst,
        limit = config.limit,
        window_secs = config.window_secs,
        "Rate limiter initialized"
    );

    Ok(backend)
}

/// Sweep interval for a backend, honouring a configured override.
pub fn sweep_interval(config: &RateLimitingConfig, backend: &dyn RateLimiterBackend) -> Duration {
    config
        .sweep_interval()
        .unwrap_or_else(|| backend.sweep_interval())
}
