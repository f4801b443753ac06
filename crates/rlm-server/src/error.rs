// crates/rlm-server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rlm_core::error::ConfigError;
use rlm_index::IndexError;
use rlm_maintainer::MaintainerError;
use serde::Serialize;
use thiserror::Error;

/// Structured JSON error response for tool/API errors.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into(), details: None }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self { error: error.into(), details: Some(details.into()) }
    }
}

/// API error types that map to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("maintainer error: {0}")]
    Maintainer(#[from] MaintainerError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("internal server error: {0}")]
    Internal(String),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::Index(index_err) => {
                let (status, error_msg) = match index_err {
                    IndexError::Io { path, source } => {
                        tracing::error!(path = %path.display(), error = %source, "index IO error");
                        (StatusCode::INTERNAL_SERVER_ERROR, "IO error accessing index")
                    }
                    IndexError::Corruption { path, reason } => {
                        tracing::warn!(path = %path.display(), reason = %reason, "index corruption, fallback path engaged");
                        (StatusCode::INTERNAL_SERVER_ERROR, "index is corrupt, rebuilding")
                    }
                    IndexError::SchemaMismatch { found, expected } => {
                        tracing::warn!(found = %found, expected = %expected, "index schema mismatch");
                        (StatusCode::INTERNAL_SERVER_ERROR, "index schema mismatch, rebuild required")
                    }
                };
                (status, ErrorResponse::with_details(error_msg, index_err.to_string()))
            }
            ApiError::Maintainer(maint_err) => {
                let (status, error_msg) = match maint_err {
                    MaintainerError::LockTimeout { path, timeout_secs } => {
                        tracing::warn!(path = %path.display(), timeout_secs = %timeout_secs, "lock timeout");
                        (StatusCode::INTERNAL_SERVER_ERROR, "timed out acquiring index lock")
                    }
                    MaintainerError::Io { path, source } => {
                        tracing::error!(path = %path.display(), error = %source, "maintainer IO error");
                        (StatusCode::INTERNAL_SERVER_ERROR, "IO error updating index")
                    }
                    MaintainerError::Parse(parse_err) => {
                        tracing::error!(error = %parse_err, "transcript parse error");
                        (StatusCode::INTERNAL_SERVER_ERROR, "failed to parse session transcript")
                    }
                    MaintainerError::Index(idx_err) => {
                        tracing::error!(error = %idx_err, "index error during maintenance");
                        (StatusCode::INTERNAL_SERVER_ERROR, "index error during maintenance")
                    }
                    MaintainerError::Join(join_err) => {
                        tracing::error!(error = %join_err, "background lock task panicked");
                        (StatusCode::INTERNAL_SERVER_ERROR, "internal task failure")
                    }
                };
                (status, ErrorResponse::with_details(error_msg, maint_err.to_string()))
            }
            ApiError::Config(config_err) => {
                tracing::error!(error = %config_err, "config error");
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::with_details("configuration error", config_err.to_string()))
            }
            ApiError::Internal(msg) => {
                tracing::error!(message = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::new("internal server error"))
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "bad request");
                (StatusCode::BAD_REQUEST, ErrorResponse::with_details("bad request", msg.clone()))
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
