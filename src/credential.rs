//! Credential resolution
//!
//! Decides which backend credential governs a request. The Authorization
//! header wins over an inline `api_key` body field; an empty credential means
//! "use the server's default identity".

use axum::http::{header, HeaderMap};
use sha2::{Digest, Sha256};

/// Extract the token from an `Authorization` header value.
///
/// The value must be exactly two whitespace-separated fields and the scheme
/// is matched case-insensitively.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    let mut fields = auth_header.split_whitespace();
    match (fields.next(), fields.next(), fields.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => Some(token),
        _ => None,
    }
}

/// Credential carried by the request headers, or empty
pub fn credential_from_headers(headers: &HeaderMap) -> String {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer_token)
        .unwrap_or_default()
        .to_string()
}

/// Credential for a chat completion request: header first, then body
pub fn resolve_credential(headers: &HeaderMap, body_api_key: Option<&str>) -> String {
    let from_header = credential_from_headers(headers);
    if !from_header.is_empty() {
        return from_header;
    }
    body_api_key.unwrap_or_default().to_string()
}

/// Short, log-safe fingerprint of a credential
pub fn fingerprint(credential: &str) -> String {
    if credential.is_empty() {
        return "default".to_string();
    }
    let mut hasher = Sha256::new();
    hasher.update(credential.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..12].to_string()
}
