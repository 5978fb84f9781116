//! Error handling for the Relay API
//!
//! Every failure is returned as
//! `{"error": msg, "errorDetails": {"errorCode": code, "errorMessage": msg}}`.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tracing::{error, warn};

use relay_core::{CoreError, ErrorKind};

use crate::error::ServerError;

/// API error, wraps a [`ServerError`] and renders it as JSON
#[derive(Debug)]
pub struct ApiError(pub ServerError);

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        ApiError(err)
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(ServerError::Core(err))
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn core_status(err: &CoreError) -> (StatusCode, &'static str) {
    match err {
        CoreError::InvalidStepOrder(_) => (StatusCode::BAD_REQUEST, "ERR_INVALID_STEP_ORDER"),
        CoreError::InvalidStatus(_) => (StatusCode::BAD_REQUEST, "ERR_INVALID_STATUS"),
        CoreError::UnknownPerson(_) => (StatusCode::NOT_FOUND, "ERR_NOT_FOUND_PERSON"),
        CoreError::RecordNotFound(_) => (StatusCode::NOT_FOUND, "ERR_NOT_FOUND_APPROVAL"),
        CoreError::PendingEntryNotFound { .. } => (StatusCode::NOT_FOUND, "ERR_NOT_FOUND_PENDING_APPROVAL"),
        CoreError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "ERR_SYNC_TIMEOUT"),
        CoreError::Transport(_) => (StatusCode::BAD_GATEWAY, "ERR_SYNC_TRANSPORT"),
        other => match other.kind() {
            ErrorKind::Validation => (StatusCode::BAD_REQUEST, "ERR_VALIDATION_ERROR"),
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, "ERR_NOT_FOUND"),
            ErrorKind::Transport => (StatusCode::BAD_GATEWAY, "ERR_SYNC_TRANSPORT"),
            ErrorKind::Invariant => (StatusCode::INTERNAL_SERVER_ERROR, "ERR_INVARIANT_VIOLATION"),
            ErrorKind::Storage => (StatusCode::INTERNAL_SERVER_ERROR, "ERR_STORAGE_ERROR"),
        },
    }
}

/// Status code and error code for a server error
pub fn status_for(err: &ServerError) -> (StatusCode, &'static str) {
    match err {
        ServerError::Core(core) => core_status(core),
        ServerError::NotFound(_) => (StatusCode::NOT_FOUND, "ERR_NOT_FOUND"),
        ServerError::ValidationError(_) => (StatusCode::BAD_REQUEST, "ERR_VALIDATION_ERROR"),
        ServerError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "ERR_SERVICE_UNAVAILABLE"),
        ServerError::ConfigError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ERR_CONFIG_ERROR"),
        ServerError::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ERR_INTERNAL_SERVER_ERROR"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_code) = status_for(&self.0);
        let message = self.0.to_string();

        if status.is_server_error() {
            error!(error_code, error = %message, "Request failed");
        } else {
            warn!(error_code, error = %message, "Request rejected");
        }

        let body = Json(json!({
            "error": message,
            "errorDetails": {
                "errorCode": error_code,
                "errorMessage": message,
            }
        }));

        (status, body).into_response()
    }
}
