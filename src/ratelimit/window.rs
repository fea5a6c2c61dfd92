//! Exact sliding-window limiter.
//!
//! Every admitted request is recorded with its timestamp. A request is
//! admitted when fewer than `limit` recorded requests for the same identifier
//! fall inside the trailing window that ends at the moment of the call.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::backend::RateLimiterBackend;
use super::decision::{format_window, BackoffAdvice, Decision, Denial};
use crate::error::{Result, TollgateError};

/// Longest accepted window.
pub const MAX_WINDOW: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Sliding-window limiter keyed by client identifier.
pub struct WindowLimiter {
    /// Admitted request instants per identifier, oldest first
    history: Mutex<HashMap<String, VecDeque<Instant>>>,
    /// Maximum requests per identifier inside the window
    limit: u32,
    /// Length of the trailing window
    window: Duration,
}

impl WindowLimiter {
    /// Create a limiter admitting `limit` requests per `window`.
    ///
    /// Fails when `limit` is zero, or when `window` is not a whole number of
    /// milliseconds between 1 ms and [`MAX_WINDOW`].
    pub fn new(limit: u32, window: Duration) -> Result<Self> {
        if limit == 0 {
            return Err(TollgateError::InvalidLimit(
                "limit must be at least 1".to_string(),
            ));
        }
        if window < Duration::from_millis(1) || window > MAX_WINDOW {
            return Err(TollgateError::InvalidLimit(format!(
                "window must be between 1ms and {}s, got {:?}",
                MAX_WINDOW.as_secs(),
                window
            )));
        }
        if window.subsec_nanos() % 1_000_000 != 0 {
            return Err(TollgateError::InvalidLimit(format!(
                "window must be a whole number of milliseconds, got {:?}",
                window
            )));
        }

        Ok(Self {
            history: Mutex::new(HashMap::new()),
            limit,
            window,
        })
    }

    /// Admit or deny a request from `identifier` now.
    ///
    /// The clock is read while holding the lock, so recorded instants are
    /// appended in order.
    pub fn allow(&self, identifier: &str) -> bool {
        let mut history = self.history.lock();
        self.admit(&mut history, identifier, Instant::now())
    }

    /// Admit or deny a request from `identifier` at `now`.
    ///
    /// The same `now` is used for the prune cutoff and the recorded
    /// timestamp. A denied request is not recorded. An instant older than the
    /// newest recorded one is inserted in order.
    pub fn allow_at(&self, identifier: &str, now: Instant) -> bool {
        let mut history = self.history.lock();
        self.admit(&mut history, identifier, now)
    }

    fn admit(
        &self,
        history: &mut HashMap<String, VecDeque<Instant>>,
        identifier: &str,
        now: Instant,
    ) -> bool {
        let cutoff = now.checked_sub(self.window);

        let admitted = match history.get_mut(identifier) {
            Some(requests) => {
                prune(requests, cutoff);
                if requests.len() >= self.limit as usize {
                    false
                } else {
                    let position = requests.partition_point(|t| *t <= now);
                    requests.insert(position, now);
                    true
                }
            }
            None => {
                let mut requests = VecDeque::with_capacity(self.limit as usize);
                requests.push_back(now);
                history.insert(identifier.to_owned(), requests);
                true
            }
        };

        trace!(
            identifier = %identifier,
            admitted = admitted,
            "Checked sliding window"
        );
        admitted
    }

    /// Prune every identifier and drop those left without requests.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let cutoff = now.checked_sub(self.window);
        let mut history = self.history.lock();
        let before = history.len();

        history.retain(|_, requests| {
            prune(requests, cutoff);
            !requests.is_empty()
        });

        before - history.len()
    }

    /// Number of requests currently recorded for `identifier`.
    pub fn recorded(&self, identifier: &str) -> usize {
        self.history
            .lock()
            .get(identifier)
            .map_or(0, VecDeque::len)
    }

    /// Whether any history exists for `identifier`.
    pub fn contains(&self, identifier: &str) -> bool {
        self.history.lock().contains_key(identifier)
    }

    /// Number of tracked identifiers.
    pub fn len(&self) -> usize {
        self.history.lock().len()
    }

    /// Whether no identifier is tracked.
    pub fn is_empty(&self) -> bool {
        self.history.lock().is_empty()
    }

    /// Maximum requests per window.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Length of the trailing window.
    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Drop instants at or before `cutoff`. `None` means the window reaches back
/// past the clock's origin, so nothing is stale.
fn prune(requests: &mut VecDeque<Instant>, cutoff: Option<Instant>) {
    let Some(cutoff) = cutoff else {
        return;
    };
    while requests.front().is_some_and(|t| *t <= cutoff) {
        requests.pop_front();
    }
}

impl RateLimiterBackend for WindowLimiter {
    fn check(&self, identifier: &str) -> Decision {
        if self.allow(identifier) {
            return Decision::Allowed;
        }

        let window = format_window(self.window);
        debug!(
            identifier = %identifier,
            limit = self.limit,
            window = %window,
            "Sliding window limit exceeded"
        );
        Decision::Denied(Denial {
            limit: self.limit.to_string(),
            advice: BackoffAdvice::Window(self.window),
            message: format!("Maximum {} requests per {}", self.limit, window),
        })
    }

    fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_interval(&self) -> Duration {
        self.window
    }

    fn tracked(&self) -> usize {
        self.len()
    }
}
