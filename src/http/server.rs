//! HTTP server exposing the rate limiter.
//!
//! | Method | Path       | Description                                        |
//! |--------|------------|----------------------------------------------------|
//! | `ANY`  | `/check`   | Forward-auth check: `204` when admitted, else `429` |
//! | `GET`  | `/healthz` | Liveness probe, not rate limited                   |
//! | `GET`  | `/stats`   | Limiter snapshot as JSON                           |
//!
//! Every path but `/healthz` passes the limiter first, including unknown
//! ones that end in `404`.

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::middleware::{enforce_rate_limit, GuardState};
use crate::error::{GuardError, Result};
use crate::ratelimit::RateLimiter;

/// HTTP server for the rate limit check endpoint.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Middleware state wrapping the rate limiter
    state: GuardState,
}

impl HttpServer {
    /// Create a new HTTP server around a rate limiter.
    pub fn new(addr: SocketAddr, limiter: Arc<RateLimiter>, trust_forwarded_for: bool) -> Self {
        Self {
            addr,
            state: GuardState::new(limiter, trust_forwarded_for),
        }
    }

    /// Build the router.
    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Start the HTTP server.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            GuardError::Io(e)
        })?;

        info!(addr = %self.addr, "Starting HTTP server for rate limit checks");

        let app = self.router();
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            GuardError::Io(e)
        })
    }
}

/// Build the router for `state`, with the limiter in front of every
/// route except the liveness probe.
pub fn router(state: GuardState) -> Router {
    let limited = Router::new()
        .route("/check", any(check_handler))
        .route("/stats", get(stats_handler))
        .fallback(not_found_handler)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            enforce_rate_limit,
        ))
        .with_state(state);

    Router::new()
        .route("/healthz", get(health_handler))
        .merge(limited)
}

/// `ANY /check` — reached only when the limiter admitted the request.
async fn check_handler() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}

/// `GET /healthz` — liveness probe.
async fn health_handler() -> &'static str {
    "ok"
}

/// `GET /stats` — limiter snapshot.
async fn stats_handler(State(state): State<GuardState>) -> impl IntoResponse {
    Json(state.limiter.snapshot())
}
