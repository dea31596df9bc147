//! Caller IP extraction: honours `X-Forwarded-For` behind a reverse
//! proxy, falling back to the socket peer address (§4.10).

use std::net::SocketAddr;

use axum::http::HeaderMap;

pub fn extract(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}
