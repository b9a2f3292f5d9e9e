//! Runtime-facing data types
//!
//! Session configuration handed to the assistant runtime, the events a
//! session emits while a turn is running, and model descriptors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool definition forwarded to the runtime.
///
/// Definitions carry no handler: the runtime may request the tool, but the
/// caller of the gateway executes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// How a system message combines with the runtime's own system prompt.
///
/// The gateway always replaces it, so callers fully own the instructions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SystemMessageMode {
    Replace,
}

/// System message override for a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemMessageConfig {
    pub mode: SystemMessageMode,
    pub content: String,
}

/// Long-lived session settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InfiniteSessionConfig {
    pub enabled: bool,
}

/// Configuration used to create one session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub model: String,
    pub streaming: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_message: Option<SystemMessageConfig>,
    /// Allow-list of tool names; `None` leaves the runtime defaults in place
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_tools: Option<Vec<String>>,
    pub infinite_sessions: InfiniteSessionConfig,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolRequest {
    pub tool_call_id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolRequest {
    /// Arguments serialized as a compact JSON string
    pub fn arguments_json(&self) -> String {
        self.arguments.to_string()
    }
}

/// Events emitted by a session while a turn runs
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Incremental assistant text
    ContentDelta(String),
    /// The assistant's complete message for the turn
    FinalMessage {
        content: Option<String>,
        tool_requests: Vec<ToolRequest>,
    },
    /// The session has nothing further to emit
    Idle,
    /// The session failed
    Error { message: String },
    /// Any event type the gateway does not act on
    Unknown(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeltaData {
    #[serde(default)]
    delta_content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageData {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_requests: Vec<ToolRequest>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorData {
    #[serde(default)]
    message: Option<String>,
}

impl SessionEvent {
    /// Decode a runtime event from its wire tag and payload.
    ///
    /// Payloads that fail to decode degrade to empty data rather than
    /// failing the turn.
    pub fn from_wire(event_type: &str, data: Value) -> Self {
        match event_type {
            "assistant.message_delta" => {
                let data: DeltaData = serde_json::from_value(data).unwrap_or_default();
                match data.delta_content {
                    Some(delta) => SessionEvent::ContentDelta(delta),
                    None => SessionEvent::Unknown(event_type.to_string()),
                }
            }
            "assistant.message" => {
                let data: MessageData = serde_json::from_value(data).unwrap_or_default();
                SessionEvent::FinalMessage {
                    content: data.content,
                    tool_requests: data.tool_requests,
                }
            }
            "session.idle" => SessionEvent::Idle,
            "session.error" => {
                let data: ErrorData = serde_json::from_value(data).unwrap_or_default();
                SessionEvent::Error {
                    message: data.message.unwrap_or_default(),
                }
            }
            other => SessionEvent::Unknown(other.to_string()),
        }
    }
}

/// Model advertised by the runtime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelInfo {
    pub id: String,
}
