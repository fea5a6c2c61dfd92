//! HTTP server implementation.

use axum::routing::get;
use axum::{middleware, Router};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::handlers;
use super::middleware::{rate_limit, RateLimitState};
use crate::error::{Result, TollgateError};

/// Build the application router.
///
/// `/health` is never rate limited; every other route passes through the
/// admission middleware.
pub fn router(state: RateLimitState) -> Router {
    let limited = Router::new()
        .route("/", get(handlers::root))
        .route("/api/v1/ping", get(handlers::ping))
        .route_layer(middleware::from_fn_with_state(state, rate_limit));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(limited)
        .layer(TraceLayer::new_for_http())
}

/// HTTP server for the rate limited API.
pub struct HttpServer {
    /// Bound listener
    listener: TcpListener,
    /// Middleware state holding the rate limiter
    state: RateLimitState,
}

impl HttpServer {
    /// Bind the server to `addr`.
    pub async fn bind(addr: SocketAddr, state: RateLimitState) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            error!(addr = %addr, error = %e, "Failed to bind HTTP listener");
            TollgateError::Io(e)
        })?;
        Ok(Self { listener, state })
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve requests until the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        info!(addr = %addr, "Starting HTTP server with graceful shutdown");

        let app = router(self.state).into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(self.listener, app)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                TollgateError::Io(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{GlobalLimiter, LimiterRegistry, RateLimiterBackend, WindowLimiter};
    use axum::body::{to_bytes, Body};
    use axum::extract::ConnectInfo;
    use axum::http::{header, Request, StatusCode};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;
    use tower::ServiceExt;

    fn state_with(backend: Arc<dyn RateLimiterBackend>, trust: bool) -> RateLimitState {
        RateLimitState::new(backend, trust)
    }

    fn get_from(uri: &str, peer: &str) -> Request<Body> {
        let addr: SocketAddr = peer.parse().unwrap();
        Request::builder()
            .uri(uri)
            .extension(ConnectInfo(addr))
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_allowed_request_reaches_handler() {
        let registry = Arc::new(LimiterRegistry::new(1.0, 5).unwrap());
        let app = router(state_with(registry, false));

        let response = app
            .oneshot(get_from("/api/v1/ping", "10.0.0.1:4000"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["message"], "pong");
    }

    #[tokio::test]
    async fn test_per_client_denial() {
        let registry = Arc::new(LimiterRegistry::new(2.0, 2).unwrap());
        let app = router(state_with(registry.clone(), false));

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(get_from("/", "10.0.0.1:4000"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .clone()
            .oneshot(get_from("/", "10.0.0.1:4001"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["x-ratelimit-limit"], "2");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");

        let body = body_json(response).await;
        assert_eq!(body["error"], "rate limit exceeded");
        assert_eq!(body["message"], "Too many requests from your IP address");

        // Another client is unaffected
        let response = app
            .oneshot(get_from("/", "10.0.0.2:4000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_window_denial() {
        let limiter = Arc::new(WindowLimiter::new(1, Duration::from_secs(60)).unwrap());
        let app = router(state_with(limiter, false));

        let response = app
            .clone()
            .oneshot(get_from("/", "10.0.0.1:4000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(get_from("/", "10.0.0.1:4000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["x-ratelimit-limit"], "1");
        assert_eq!(response.headers()["x-ratelimit-window"], "60s");
        assert!(response.headers().get(header::RETRY_AFTER).is_none());

        let body = body_json(response).await;
        assert_eq!(body["message"], "Maximum 1 requests per 60s");
    }

    #[tokio::test]
    async fn test_global_limit_applies_to_all_clients() {
        let limiter = Arc::new(GlobalLimiter::new(0.5, 1, 2).unwrap());
        let app = router(state_with(limiter, false));

        let response = app
            .clone()
            .oneshot(get_from("/", "10.0.0.1:4000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(get_from("/", "10.0.0.2:4000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["x-ratelimit-limit"], "0.50");
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");
    }

    #[tokio::test]
    async fn test_health_is_not_rate_limited() {
        let limiter = Arc::new(WindowLimiter::new(1, Duration::from_secs(60)).unwrap());
        let app = router(state_with(limiter.clone(), false));

        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(get_from("/health", "10.0.0.1:4000"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_json(response).await["status"], "healthy");
        }
        assert!(limiter.is_empty());
    }

    #[tokio::test]
    async fn test_forwarded_clients_tracked_separately() {
        let registry = Arc::new(LimiterRegistry::new(1.0, 1).unwrap());
        let app = router(state_with(registry.clone(), true));

        for client in ["203.0.113.1", "203.0.113.2"] {
            let request = Request::builder()
                .uri("/")
                .header("x-forwarded-for", client)
                .extension(ConnectInfo("10.0.0.1:4000".parse::<SocketAddr>().unwrap()))
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        assert!(registry.contains("203.0.113.1"));
        assert!(registry.contains("203.0.113.2"));
        assert!(!registry.contains("10.0.0.1"));
    }

    #[tokio::test]
    async fn test_server_uses_peer_address() {
        let registry = Arc::new(LimiterRegistry::new(1.0, 1).unwrap());
        let server = HttpServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            state_with(registry.clone(), false),
        )
        .await
        .unwrap();
        let addr = server.local_addr().unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve_with_shutdown(async move {
            let _ = stop_rx.await;
        }));

        let mut statuses = Vec::new();
        for _ in 0..2 {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream
                .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();
            let mut raw = String::new();
            stream.read_to_string(&mut raw).await.unwrap();
            statuses.push(raw.lines().next().unwrap_or_default().to_string());
        }

        assert!(statuses[0].contains("200"), "got {}", statuses[0]);
        assert!(statuses[1].contains("429"), "got {}", statuses[1]);
        assert!(registry.contains("127.0.0.1"));

        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
