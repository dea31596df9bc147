//! HTTP basic auth in front of `/api/admin/*` (§4.10).

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::state::AppState;

pub async fn require_admin(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, StatusCode> {
    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let encoded = header_value.strip_prefix("Basic ").ok_or(StatusCode::UNAUTHORIZED)?;
    let decoded = BASE64.decode(encoded).map_err(|_| StatusCode::UNAUTHORIZED)?;
    let credentials = String::from_utf8(decoded).map_err(|_| StatusCode::UNAUTHORIZED)?;
    let (user, pass) = credentials.split_once(':').ok_or(StatusCode::UNAUTHORIZED)?;

    let admin = &state.coordinator.config().admin;
    if user == admin.user && pass == admin.pass {
        Ok(next.run(req).await)
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}
