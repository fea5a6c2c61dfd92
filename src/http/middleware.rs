//! Admission middleware.

use axum::extract::{Request, State};
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, trace};

use super::client_ip::client_identifier;
use crate::ratelimit::{format_window, BackoffAdvice, Decision, Denial, RateLimiterBackend};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_WINDOW: HeaderName = HeaderName::from_static("x-ratelimit-window");

/// Shared state for the admission middleware.
#[derive(Clone)]
pub struct RateLimitState {
    /// The rate limiter instance
    pub backend: Arc<dyn RateLimiterBackend>,
    /// Whether forwarding headers identify the client
    pub trust_forwarded_headers: bool,
}

impl RateLimitState {
    pub fn new(backend: Arc<dyn RateLimiterBackend>, trust_forwarded_headers: bool) -> Self {
        Self {
            backend,
            trust_forwarded_headers,
        }
    }
}

/// Body of a rejected request.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}

/// Admit the request or short-circuit with `429 Too Many Requests`.
pub async fn rate_limit(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let identifier = client_identifier(&request, state.trust_forwarded_headers);

    match state.backend.check(&identifier) {
        Decision::Allowed => {
            trace!(identifier = %identifier, "Request admitted");
            next.run(request).await
        }
        Decision::Denied(denial) => {
            info!(
                identifier = %identifier,
                method = %request.method(),
                path = %request.uri().path(),
                "Request rejected by rate limiter"
            );
            denial.into_response()
        }
    }
}

impl IntoResponse for Denial {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: "rate limit exceeded",
            message: self.message,
        };
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();

        let headers = response.headers_mut();
        if let Ok(limit) = HeaderValue::from_str(&self.limit) {
            headers.insert(X_RATELIMIT_LIMIT, limit);
        }
        headers.insert(
            X_RATELIMIT_REMAINING,
            HeaderValue::from(Denial::REMAINING),
        );
        match self.advice {
            BackoffAdvice::RetryAfter(secs) => {
                headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
            }
            BackoffAdvice::Window(window) => {
                if let Ok(value) = HeaderValue::from_str(&format_window(window)) {
                    headers.insert(X_RATELIMIT_WINDOW, value);
                }
            }
        }

        response
    }
}
