//! HTTP error mapping.
//!
//! The provider only distinguishes 2xx from everything else: a non-2xx
//! means "redeliver". Errors therefore map to 400 (will never succeed
//! as sent), 503 (transient, redeliver) or 500.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dealdesk_types::DealdeskError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Machine-readable code, e.g. `INVALID_SIGNATURE`.
    pub code: String,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum AppError {
    /// Signature missing, malformed, stale or wrong (400).
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Storage unavailable or contended; the provider should retry (503).
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Anything else (500). Details are logged, not returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::InvalidSignature(_) => (StatusCode::BAD_REQUEST, "INVALID_SIGNATURE"),
            Self::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            Self::Internal(_) => {
                tracing::error!(error = %self, "internal server error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<DealdeskError> for AppError {
    fn from(err: DealdeskError) -> Self {
        match &err {
            DealdeskError::InvalidSignature { reason } => Self::InvalidSignature(reason.clone()),
            e if e.is_retryable() => Self::Unavailable(err.to_string()),
            _ => Self::Internal(err.to_string()),
        }
    }
}
