//! Rate limiting middleware for axum.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

use super::identity::client_identity;
use crate::ratelimit::{Decision, RateLimiter};

/// Body of every 429 response.
pub const TOO_MANY_REQUESTS_BODY: &str = "Too many requests - please try again later.";

/// State shared by the rate limiting middleware.
#[derive(Clone)]
pub struct GuardState {
    /// The rate limiter consulted for every request
    pub limiter: Arc<RateLimiter>,
    /// Derive identity from `X-Forwarded-For` when present
    pub trust_forwarded_for: bool,
}

impl GuardState {
    /// Create middleware state for `limiter`.
    pub fn new(limiter: Arc<RateLimiter>, trust_forwarded_for: bool) -> Self {
        Self {
            limiter,
            trust_forwarded_for,
        }
    }
}

/// Consult the limiter before the request reaches any handler.
///
/// Install with `axum::middleware::from_fn_with_state`. Rejected requests
/// get `429 Too Many Requests` with a plain-text body and, while the
/// identity is blocked, a `Retry-After` header in whole seconds.
pub async fn enforce_rate_limit(
    State(state): State<GuardState>,
    request: Request,
    next: Next,
) -> Response {
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let identity = client_identity(request.headers(), remote_addr, state.trust_forwarded_for);

    match state.limiter.evaluate(&identity) {
        Decision::Admit => next.run(request).await,
        Decision::Reject => {
            debug!(
                identity = %identity,
                path = %request.uri().path(),
                "Request rejected by rate limiter"
            );
            too_many_requests(&state.limiter, &identity)
        }
    }
}

fn too_many_requests(limiter: &RateLimiter, identity: &str) -> Response {
    match limiter.retry_after(identity) {
        Some(remaining) => {
            // Round up so clients never retry before the block lifts.
            let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, secs.to_string())],
                TOO_MANY_REQUESTS_BODY,
            )
                .into_response()
        }
        None => (StatusCode::TOO_MANY_REQUESTS, TOO_MANY_REQUESTS_BODY).into_response(),
    }
}
