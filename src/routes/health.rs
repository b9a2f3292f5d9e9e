//! Health check endpoint

/// Liveness check
///
/// Returns a plain `OK` while the process is serving requests.
pub async fn health_check() -> &'static str {
    "OK"
}
