use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;
use tracing::error;

/// Canonical JSON payload for messages and error responses.
#[derive(Debug, Serialize, Clone)]
pub struct ApiMessage {
    pub message: String,
}

impl ApiMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type ApiError = (StatusCode, Json<ApiMessage>);
pub type ApiResult<T> = Result<T, ApiError>;

/// Helper for controllers that need to return `(StatusCode, Json<ApiMessage>)`.
pub fn json_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ApiMessage::new(message)))
}

pub fn not_found(message: impl Into<String>) -> ApiError {
    json_error(StatusCode::NOT_FOUND, message)
}

pub fn forbidden(message: impl Into<String>) -> ApiError {
    json_error(StatusCode::FORBIDDEN, message)
}

pub fn conflict(message: impl Into<String>) -> ApiError {
    json_error(StatusCode::CONFLICT, message)
}

pub fn bad_request(message: impl Into<String>) -> ApiError {
    json_error(StatusCode::BAD_REQUEST, message)
}

pub fn internal_error(err: anyhow::Error) -> ApiError {
    error!(?err, "internal error while handling request");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}
