//! Maps `CoordinatorError` onto HTTP status codes and the `{result,
//! message}` JSON error envelope (§7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use coordinator_model::error::{CoordinatorError, ErrorKind};
use serde_json::json;

pub struct AppError(pub CoordinatorError);

impl From<CoordinatorError> for AppError {
    fn from(e: CoordinatorError) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::DuplicateJob => StatusCode::CONFLICT,
            ErrorKind::UnknownJob => StatusCode::NOT_FOUND,
            ErrorKind::FaultyResult => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::ClientRejected => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "internal error");
        }
        let body = json!({ "result": "error", "message": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}
