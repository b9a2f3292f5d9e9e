//! Upstream error classification
//!
//! Session errors arrive as free text. This module maps them to an HTTP
//! status, an OpenAI error type and a message fit for the caller.

use axum::http::StatusCode;
use once_cell::sync::Lazy;
use regex::Regex;

/// Structured upstream error marker, e.g. `CAPIError: 400 400 Bad Request`
static CAPI_ERROR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"CAPIError:\s*(\d{3})").expect("valid CAPIError pattern"));

/// Prefix the runtime puts in front of the last underlying failure
const LAST_ERROR_MARKER: &str = "Last error:";

/// Message used when the upstream text is blank
pub const FALLBACK_MESSAGE: &str = "Upstream model request failed";

/// Classified upstream failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamFailure {
    pub status: StatusCode,
    pub error_type: &'static str,
    pub message: String,
}

/// Classify a raw session error message
pub fn classify(raw: &str) -> UpstreamFailure {
    let status = status_from_session_error(raw);
    UpstreamFailure {
        status,
        error_type: error_type_for_status(status),
        message: user_message_from_session_error(raw),
    }
}

/// HTTP status for a raw session error message
pub fn status_from_session_error(raw: &str) -> StatusCode {
    if let Some(code) = CAPI_ERROR
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
    {
        if code.is_client_error() || code.is_server_error() {
            return code;
        }
    }

    let lowered = raw.to_lowercase();
    if lowered.contains("timeout") || lowered.contains("timed out") {
        return StatusCode::GATEWAY_TIMEOUT;
    }

    StatusCode::BAD_GATEWAY
}

/// Caller-facing message for a raw session error message
pub fn user_message_from_session_error(raw: &str) -> String {
    let message = match raw.rfind(LAST_ERROR_MARKER) {
        Some(pos) => &raw[pos + LAST_ERROR_MARKER.len()..],
        None => raw,
    };

    let message = message.trim();
    if message.is_empty() {
        FALLBACK_MESSAGE.to_string()
    } else {
        message.to_string()
    }
}

/// OpenAI error type for a status code
pub fn error_type_for_status(status: StatusCode) -> &'static str {
    match status {
        StatusCode::UNAUTHORIZED => "authentication_error",
        StatusCode::BAD_REQUEST => "invalid_request_error",
        _ => "api_error",
    }
}
