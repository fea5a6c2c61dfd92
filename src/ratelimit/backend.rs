//! Rate limiter trait for abstracting over the admission strategies.

use std::time::Duration;

use super::decision::Decision;

/// Trait for rate limiter implementations.
///
/// This trait abstracts over the global bucket, the per-client registry and
/// the sliding window so the HTTP layer and the sweeper can work with any of
/// them. Every method returns immediately; none of them wait for capacity.
pub trait RateLimiterBackend: Send + Sync {
    /// Decide whether a request from `identifier` may proceed now.
    fn check(&self, identifier: &str) -> Decision;

    /// Evict state for identifiers that are no longer active.
    ///
    /// Returns the number of evicted identifiers.
    fn sweep(&self) -> usize;

    /// How often `sweep` should run when no override is configured.
    fn sweep_interval(&self) -> Duration;

    /// Number of identifiers currently holding state.
    fn tracked(&self) -> usize;
}
