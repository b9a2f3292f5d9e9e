//! JSON-RPC 2.0 framing over stdio
//!
//! Messages are framed with a `Content-Length` header followed by a blank
//! line, the same framing language servers use.

use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::runtime::error::{RuntimeError, RuntimeResult};

/// Maximum Content-Length we'll accept (32MB) to prevent OOM
const MAX_CONTENT_LENGTH: usize = 32 * 1024 * 1024;

/// JSON-RPC "method not found" error code
pub const METHOD_NOT_FOUND: i64 = -32601;

/// A decoded message received from the runtime
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Reply to one of our requests
    Response {
        id: u64,
        result: Result<Value, (i64, String)>,
    },
    /// Request initiated by the runtime
    Request {
        id: Value,
        method: String,
        params: Value,
    },
    /// Fire-and-forget notification
    Notification { method: String, params: Value },
}

impl Incoming {
    /// Classify a raw JSON-RPC message
    pub fn classify(message: Value) -> RuntimeResult<Self> {
        let method = message.get("method").and_then(Value::as_str).map(str::to_string);
        let id = message.get("id").cloned().filter(|id| !id.is_null());
        let params = message.get("params").cloned().unwrap_or(Value::Null);

        match (method, id) {
            (Some(method), Some(id)) => Ok(Incoming::Request { id, method, params }),
            (Some(method), None) => Ok(Incoming::Notification { method, params }),
            (None, Some(id)) => {
                let id = id.as_u64().ok_or_else(|| {
                    RuntimeError::Protocol(format!("Unexpected response id: {}", id))
                })?;
                let result = match message.get("error") {
                    Some(error) => Err((
                        error.get("code").and_then(Value::as_i64).unwrap_or(0),
                        error
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    )),
                    None => Ok(message.get("result").cloned().unwrap_or(Value::Null)),
                };
                Ok(Incoming::Response { id, result })
            }
            (None, None) => Err(RuntimeError::Protocol(
                "Message has neither method nor id".to_string(),
            )),
        }
    }
}

/// Build a request envelope
pub fn request(id: u64, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
}

/// Build an error reply to a runtime-initiated request
pub fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": code, "message": message},
    })
}

/// Write one framed message
pub async fn write_message<W>(writer: &mut W, message: &Value) -> RuntimeResult<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let content = serde_json::to_string(message)?;
    let frame = format!("Content-Length: {}\r\n\r\n{}", content.len(), content);
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message. Returns `None` on a clean EOF.
pub async fn read_message<R>(reader: &mut R) -> RuntimeResult<Option<Value>>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut content_length: Option<usize> = None;
    let mut saw_header = false;

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;

        if n == 0 {
            if saw_header {
                return Err(RuntimeError::Protocol(
                    "EOF while reading message headers".to_string(),
                ));
            }
            return Ok(None);
        }

        let line = line.trim_end_matches(&['\r', '\n'][..]);
        if line.is_empty() {
            if saw_header {
                break;
            }
            continue;
        }
        saw_header = true;

        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("Content-Length") {
                content_length = value.trim().parse::<usize>().ok();
            }
        }
    }

    let content_length = content_length
        .ok_or_else(|| RuntimeError::Protocol("Missing Content-Length header".to_string()))?;

    if content_length > MAX_CONTENT_LENGTH {
        return Err(RuntimeError::Protocol(format!(
            "Content-Length {} exceeds maximum allowed {}",
            content_length, MAX_CONTENT_LENGTH
        )));
    }

    let mut buffer = vec![0; content_length];
    reader.read_exact(&mut buffer).await?;

    Ok(Some(serde_json::from_slice(&buffer)?))
}
