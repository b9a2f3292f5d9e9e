//! Turn engine
//!
//! Drives one assistant session per request through a single turn and
//! renders the result either as one aggregated completion or as an SSE
//! stream of completion chunks.

pub mod aggregate;
pub mod guard;
pub mod sse;

use axum::http::StatusCode;
use bytes::Bytes;

use crate::error::AppError;
use crate::openai::StreamChunk;

pub use aggregate::complete;
pub use guard::SessionGuard;
pub use sse::stream_completion;

/// Message for a session whose event channel closed mid-turn
const SESSION_ENDED: &str = "Session ended unexpectedly";

/// New chat completion id
pub fn completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

/// Current unix time in seconds
pub fn unix_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Format a stream chunk as an SSE data event: `data: {json}\n\n`
pub fn format_sse_chunk(chunk: &StreamChunk) -> Bytes {
    // Plain structs with string keys; serialization cannot fail
    let json = serde_json::to_string(chunk).unwrap_or_default();
    Bytes::from(format!("data: {}\n\n", json))
}

/// The stream terminator: `data: [DONE]\n\n`
pub fn format_sse_done() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}

fn session_ended() -> AppError {
    AppError::Upstream {
        status: StatusCode::BAD_GATEWAY,
        message: SESSION_ENDED.to_string(),
    }
}
