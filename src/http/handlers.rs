//! Route handlers.

use axum::Json;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Plain message response.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "tollgate",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Hello World",
    })
}

pub async fn ping() -> Json<MessageResponse> {
    Json(MessageResponse { message: "pong" })
}
