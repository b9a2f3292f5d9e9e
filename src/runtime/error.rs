//! Error types for the assistant runtime layer

use thiserror::Error;

/// Errors raised while talking to the assistant runtime
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to spawn runtime process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Runtime I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Runtime protocol error: {0}")]
    Protocol(String),

    #[error("Runtime returned error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Runtime connection closed")]
    Closed,

    #[error("Runtime client is not started")]
    NotStarted,

    #[error("Session events already subscribed")]
    AlreadySubscribed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;
