//! Admission decisions and the advisory data attached to a denial.

use std::time::Duration;

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed
    Allowed,
    /// The request is over limit
    Denied(Denial),
}

impl Decision {
    /// Whether the request was admitted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// How a denied client should back off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffAdvice {
    /// Fixed number of seconds to wait (`Retry-After`)
    RetryAfter(u64),
    /// Length of the trailing window (`X-RateLimit-Window`)
    Window(Duration),
}

/// Structured information returned with a denied request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    /// Rendered value of the `X-RateLimit-Limit` header
    pub limit: String,
    /// Back-off hint for the client
    pub advice: BackoffAdvice,
    /// Human-readable explanation
    pub message: String,
}

impl Denial {
    /// Remaining quota reported with every denial.
    pub const REMAINING: u32 = 0;
}

/// Render a permits-per-second rate for a header.
///
/// Whole rates are printed as integers, fractional rates with exactly two
/// decimals.
pub fn format_rate(rate: f64) -> String {
    if rate.fract() == 0.0 {
        format!("{}", rate)
    } else {
        format!("{:.2}", rate)
    }
}

/// Render a window length: `{n}s` for whole seconds, `{n}ms` otherwise.
///
/// Windows are whole milliseconds, so the `ms` form is exact.
pub fn format_window(window: Duration) -> String {
    if window.subsec_nanos() == 0 {
        format!("{}s", window.as_secs())
    } else {
        format!("{}ms", window.as_millis())
    }
}
