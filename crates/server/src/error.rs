// crates/server/src/error.rs
use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use remote_exec_jobs::{ExecError, PathError, RegistryError};
use serde::Serialize;
use thiserror::Error;

/// Structured JSON error response for API errors
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Forbidden")]
    Forbidden,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("Invalid file name: {0}")]
    Path(#[from] PathError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::Forbidden => (StatusCode::FORBIDDEN, ErrorResponse::new("Forbidden")),
            ApiError::BadRequest(msg) => {
                tracing::debug!(error = %msg, "Bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", msg),
                )
            }
            ApiError::Path(err) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::with_details("Invalid file name", err.to_string()),
            ),
            ApiError::Exec(exec_err) => match exec_err {
                ExecError::Timeout { command, after } => {
                    tracing::warn!(cmd_line = %command, timeout = ?after, "Command timed out");
                    (StatusCode::REQUEST_TIMEOUT, ErrorResponse::new("timeout"))
                }
                ExecError::Spawn { command, source } => {
                    tracing::error!(cmd_line = %command, error = %source, "Spawn failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ErrorResponse::with_details("Cannot start command", exec_err.to_string()),
                    )
                }
                ExecError::Wait { command, source } => {
                    tracing::error!(cmd_line = %command, error = %source, "Wait failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ErrorResponse::with_details("Command failed", exec_err.to_string()),
                    )
                }
                ExecError::Path(err) => (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Invalid capture path", err.to_string()),
                ),
                ExecError::Registry(_) => registry_unavailable(),
            },
            ApiError::Registry(_) => registry_unavailable(),
            ApiError::Write { path, source } => {
                tracing::error!(path = %path.display(), error = %source, "Upload write failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_details("Cannot write file", source.to_string()),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

fn registry_unavailable() -> (StatusCode, ErrorResponse) {
    tracing::error!("Job registry is not running");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorResponse::new("Internal server error"),
    )
}

/// Convenience type alias for handler results
pub type ApiResult<T> = Result<T, ApiError>;
