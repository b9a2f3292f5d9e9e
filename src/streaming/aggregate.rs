//! Non-streaming turns
//!
//! Collects a whole turn into one `chat.completion` object.

use std::time::Duration;

use tracing::{debug, warn};

use super::{completion_id, session_ended, unix_timestamp, SessionGuard};
use crate::error::{AppError, AppResult};
use crate::openai::{
    ChatCompletionResponse, Choice, FinishReason, ResponseMessage, Role, ToolCall,
    ToolCallFunction,
};
use crate::routes::metrics::record_upstream_error;
use crate::runtime::{AssistantSession, EventReceiver, SessionEvent};

/// What a finished turn produced
#[derive(Debug, Default)]
struct TurnOutput {
    content: String,
    tool_calls: Vec<ToolCall>,
}

impl TurnOutput {
    fn finish_reason(&self) -> FinishReason {
        if self.tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        }
    }

    fn into_response(self, model: &str) -> ChatCompletionResponse {
        let finish_reason = self.finish_reason();
        let content = if self.content.is_empty() && !self.tool_calls.is_empty() {
            None
        } else {
            Some(self.content)
        };

        ChatCompletionResponse {
            id: completion_id(),
            object: "chat.completion".to_string(),
            created: unix_timestamp(),
            model: model.to_string(),
            choices: vec![Choice {
                index: 0,
                message: ResponseMessage {
                    role: Role::Assistant,
                    content,
                    tool_calls: self.tool_calls,
                },
                finish_reason,
            }],
        }
    }
}

/// Run one turn and aggregate it.
///
/// The session is destroyed before returning, whatever the outcome.
pub async fn complete(
    guard: SessionGuard,
    prompt: &str,
    model: &str,
    timeout: Duration,
) -> AppResult<ChatCompletionResponse> {
    let outcome = run_turn(guard.session(), prompt, timeout).await;
    guard.release().await;

    outcome.map(|output| output.into_response(model))
}

async fn run_turn(
    session: &dyn AssistantSession,
    prompt: &str,
    timeout: Duration,
) -> AppResult<TurnOutput> {
    let events = session.subscribe().map_err(|e| {
        warn!(error = %e, "Failed to subscribe to session events");
        AppError::Internal("Failed to send message".to_string())
    })?;

    session.send(prompt).await.map_err(|e| {
        warn!(error = %e, "Failed to send message");
        AppError::Internal("Failed to send message".to_string())
    })?;

    match tokio::time::timeout(timeout, collect(events)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs(), "Request timed out");
            Err(AppError::Timeout)
        }
    }
}

/// Drain events until the turn ends.
///
/// Leaving this loop is the one completion point of the turn, so late events
/// racing an earlier terminal event are never observed.
async fn collect(mut events: EventReceiver) -> AppResult<TurnOutput> {
    let mut output = TurnOutput::default();

    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::ContentDelta(_) => {}
            SessionEvent::FinalMessage {
                content,
                tool_requests,
            } => {
                if let Some(content) = content {
                    output.content.push_str(&content);
                }
                output
                    .tool_calls
                    .extend(tool_requests.into_iter().map(|request| ToolCall {
                        call_type: "function".to_string(),
                        function: ToolCallFunction {
                            arguments: request.arguments_json(),
                            name: request.name,
                        },
                        id: request.tool_call_id,
                    }));
            }
            SessionEvent::Idle => return Ok(output),
            SessionEvent::Error { message } => {
                warn!(error = %message, "Session error");
                let error = AppError::from_session_error(&message);
                record_upstream_error(error.status_code());
                return Err(error);
            }
            SessionEvent::Unknown(tag) => debug!(event = %tag, "Ignoring session event"),
        }
    }

    Err(session_ended())
}
