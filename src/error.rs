//! Error types for the gateway
//!
//! Every error leaving an HTTP handler is rendered in OpenAI's error shape:
//! `{"error": {"message", "type", "param"?, "code"?}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classify::{self, UpstreamFailure};
use crate::pool::PoolError;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Missing or invalid API key")]
    Unauthorized,

    #[error("{message}")]
    Upstream { status: StatusCode, message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Build an upstream error from a raw session error message
    pub fn from_session_error(raw: &str) -> Self {
        let UpstreamFailure { status, message, .. } = classify::classify(raw);
        AppError::Upstream { status, message }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Upstream { status, .. } => *status,
            AppError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) | AppError::MethodNotAllowed => "invalid_request_error",
            AppError::Unauthorized => "authentication_error",
            AppError::Upstream { status, .. } => classify::error_type_for_status(*status),
            AppError::Timeout | AppError::Internal(_) => "api_error",
        }
    }
}

impl From<PoolError> for AppError {
    fn from(_: PoolError) -> Self {
        AppError::Unauthorized
    }
}

/// Error response body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error details
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                message: self.to_string(),
                error_type: self.error_type().to_string(),
                param: None,
                code: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
