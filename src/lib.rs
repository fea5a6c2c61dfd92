//! Tollgate - Per-client HTTP Rate Limiting
//!
//! This crate implements request admission control for HTTP services. Clients
//! are identified by network address and limited by one of three strategies:
//! a global token bucket, a token bucket per client, or an exact sliding
//! window per client. Idle per-client state is evicted by a background sweeper.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
