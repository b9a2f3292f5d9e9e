//! Streaming turns
//!
//! A driver task consumes session events and pushes ready SSE frames over a
//! channel. The HTTP response is only built once the first frame exists, so
//! anything that fails before then is still reported as a JSON error.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{
    completion_id, format_sse_chunk, format_sse_done, session_ended, unix_timestamp, SessionGuard,
};
use crate::error::{AppError, AppResult};
use crate::openai::{
    Delta, FinishReason, Role, StreamChoice, StreamChunk, ToolCallDelta, ToolCallFunctionDelta,
};
use crate::routes::metrics::record_upstream_error;
use crate::runtime::{EventReceiver, SessionEvent, ToolRequest};

/// Frames buffered between the driver and the response body
const FRAME_BUFFER: usize = 32;

/// Driver output
#[derive(Debug)]
enum Outbound {
    Frame(Bytes),
    /// The turn failed before anything was written
    Failed(AppError),
}

/// The HTTP side stopped reading
#[derive(Debug)]
struct ClientGone;

/// How the event loop ended
#[derive(Debug)]
enum TurnEnd {
    Finished,
    SessionError(String),
    Closed,
}

/// Start a streaming turn.
///
/// Resolves once the first frame is ready (`Ok`, stream committed) or the
/// turn has failed without output (`Err`). The session is released by the
/// driver task on every path.
pub async fn stream_completion(
    guard: SessionGuard,
    prompt: &str,
    model: &str,
    timeout: Duration,
) -> AppResult<Response> {
    let events = match guard.session().subscribe() {
        Ok(events) => events,
        Err(e) => {
            warn!(error = %e, "Failed to subscribe to session events");
            guard.release().await;
            return Err(AppError::Internal("Failed to send message".to_string()));
        }
    };

    if let Err(e) = guard.session().send(prompt).await {
        warn!(error = %e, "Failed to send message");
        guard.release().await;
        return Err(AppError::Internal("Failed to send message".to_string()));
    }

    let (tx, mut rx) = mpsc::channel(FRAME_BUFFER);
    let writer = SseWriter::new(model, tx);
    tokio::spawn(drive(guard, events, writer, timeout));

    let first = match rx.recv().await {
        Some(Outbound::Frame(frame)) => frame,
        Some(Outbound::Failed(e)) => return Err(e),
        None => return Err(AppError::Internal("Stream ended before any output".to_string())),
    };

    let body = async_stream::stream! {
        yield Ok::<Bytes, Infallible>(first);
        while let Some(outbound) = rx.recv().await {
            match outbound {
                Outbound::Frame(frame) => yield Ok(frame),
                Outbound::Failed(e) => {
                    debug!(error = %e, "Stream failed after commit");
                    break;
                }
            }
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(body))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}

/// Run the turn to completion, then release the session
async fn drive(
    guard: SessionGuard,
    mut events: EventReceiver,
    mut writer: SseWriter,
    timeout: Duration,
) {
    let outcome = tokio::time::timeout(timeout, pump(&mut events, &mut writer)).await;

    let delivered = match outcome {
        Ok(Ok(TurnEnd::Finished)) => writer.finish().await,
        Ok(Ok(TurnEnd::SessionError(message))) => {
            warn!(error = %message, "Session error");
            let error = AppError::from_session_error(&message);
            record_upstream_error(error.status_code());
            if writer.committed {
                // Output already reached the caller; close the turn as it stands
                writer.finish().await
            } else {
                writer.fail(error).await
            }
        }
        Ok(Ok(TurnEnd::Closed)) => {
            warn!("Session event channel closed mid-turn");
            writer.fail(session_ended()).await
        }
        Ok(Err(ClientGone)) => Err(ClientGone),
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs(), "Streaming request timed out");
            writer.fail(AppError::Timeout).await
        }
    };

    if delivered.is_err() {
        info!("Client disconnected, abandoning turn");
    }

    guard.release().await;
}

/// Translate session events into frames until the turn ends
async fn pump(events: &mut EventReceiver, writer: &mut SseWriter) -> Result<TurnEnd, ClientGone> {
    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = writer.tx.closed() => return Err(ClientGone),
        };

        let Some(event) = event else {
            return Ok(TurnEnd::Closed);
        };

        match event {
            SessionEvent::ContentDelta(text) => {
                writer.pending_deltas = true;
                writer.content(text).await?;
            }
            SessionEvent::FinalMessage {
                content,
                tool_requests,
            } => {
                // A message with no deltas of its own still delivers its text here
                if let Some(content) = content.filter(|c| !c.is_empty()) {
                    if !writer.pending_deltas {
                        writer.content(content).await?;
                    }
                }
                writer.pending_deltas = false;
                if !tool_requests.is_empty() {
                    for request in &tool_requests {
                        writer.tool_call(request).await?;
                    }
                    // Tool-call turns end here; the caller runs the tools
                    return Ok(TurnEnd::Finished);
                }
            }
            SessionEvent::Idle => return Ok(TurnEnd::Finished),
            SessionEvent::Error { message } => return Ok(TurnEnd::SessionError(message)),
            SessionEvent::Unknown(tag) => debug!(event = %tag, "Ignoring session event"),
        }
    }
}

/// Frame writer with an explicit commit flag.
///
/// Nothing is sent until the first real emission, which is preceded by the
/// role chunk.
struct SseWriter {
    id: String,
    created: i64,
    model: String,
    tx: mpsc::Sender<Outbound>,
    committed: bool,
    /// Deltas arrived since the last final message
    pending_deltas: bool,
    tool_calls: u32,
}

impl SseWriter {
    fn new(model: &str, tx: mpsc::Sender<Outbound>) -> Self {
        Self {
            id: completion_id(),
            created: unix_timestamp(),
            model: model.to_string(),
            tx,
            committed: false,
            pending_deltas: false,
            tool_calls: 0,
        }
    }

    fn chunk(&self, delta: Delta, finish_reason: Option<FinishReason>) -> StreamChunk {
        StreamChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![StreamChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        }
    }

    async fn send(&self, outbound: Outbound) -> Result<(), ClientGone> {
        self.tx.send(outbound).await.map_err(|_| ClientGone)
    }

    async fn emit(
        &mut self,
        delta: Delta,
        finish_reason: Option<FinishReason>,
    ) -> Result<(), ClientGone> {
        if !self.committed {
            self.committed = true;
            let role = Delta {
                role: Some(Role::Assistant),
                ..Default::default()
            };
            self.send(Outbound::Frame(format_sse_chunk(&self.chunk(role, None))))
                .await?;
        }
        let frame = format_sse_chunk(&self.chunk(delta, finish_reason));
        self.send(Outbound::Frame(frame)).await
    }

    async fn content(&mut self, text: String) -> Result<(), ClientGone> {
        self.emit(
            Delta {
                content: Some(text),
                ..Default::default()
            },
            None,
        )
        .await
    }

    /// Emit one tool call as a name frame followed by an arguments frame
    async fn tool_call(&mut self, request: &ToolRequest) -> Result<(), ClientGone> {
        let index = self.tool_calls;
        self.tool_calls += 1;

        let header = ToolCallDelta {
            index,
            id: Some(request.tool_call_id.clone()),
            call_type: Some("function".to_string()),
            function: ToolCallFunctionDelta {
                name: Some(request.name.clone()),
                arguments: None,
            },
        };
        let arguments = ToolCallDelta {
            index,
            id: None,
            call_type: None,
            function: ToolCallFunctionDelta {
                name: None,
                arguments: Some(request.arguments_json()),
            },
        };

        for call in [header, arguments] {
            self.emit(
                Delta {
                    tool_calls: Some(vec![call]),
                    ..Default::default()
                },
                None,
            )
            .await?;
        }
        Ok(())
    }

    /// Finish chunk followed by the `[DONE]` terminator
    async fn finish(&mut self) -> Result<(), ClientGone> {
        let reason = if self.tool_calls > 0 {
            FinishReason::ToolCalls
        } else {
            FinishReason::Stop
        };
        self.emit(Delta::default(), Some(reason)).await?;
        self.send(Outbound::Frame(format_sse_done())).await
    }

    /// Report a failure; after commit the stream just ends without `[DONE]`
    async fn fail(&mut self, error: AppError) -> Result<(), ClientGone> {
        self.send(Outbound::Failed(error)).await
    }
}
