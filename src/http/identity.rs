//! Client identity derivation.

use axum::http::HeaderMap;
use std::net::SocketAddr;

/// Header carrying the original client address when behind a proxy.
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Identity used when neither a forwarded address nor the peer address is known.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Derive the rate limiting identity for a request.
///
/// Uses the first comma-separated entry of `X-Forwarded-For` when
/// `trust_forwarded_for` is set and that entry is non-empty, otherwise the
/// IP of the connecting peer.
pub fn client_identity(
    headers: &HeaderMap,
    remote_addr: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get(FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        if let Some(first) = forwarded {
            return first.to_string();
        }
    }

    remote_addr
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string())
}
