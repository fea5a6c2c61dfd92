//! HTTP surface: admission middleware, routes and server.

mod client_ip;
mod handlers;
mod middleware;
mod server;

pub use client_ip::{client_identifier, UNKNOWN_CLIENT};
pub use handlers::{HealthResponse, MessageResponse};
pub use middleware::{
    rate_limit, ErrorResponse, RateLimitState, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING,
    X_RATELIMIT_WINDOW,
};
pub use server::{router, HttpServer};
