//! Request-side types of the OpenAI chat completion API
//!
//! Only the fields the gateway reads are typed. Sampling parameters and other
//! OpenAI fields fall through serde's unknown-field handling, so stock
//! clients are accepted but nothing they set is forwarded.

use serde::{Deserialize, Deserializer, Serialize};

/// Role of a message participant
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Developer,
    User,
    Assistant,
    Tool,
    /// Any role this gateway does not render
    #[serde(other)]
    Unknown,
}

impl Role {
    /// Roles whose content feeds the session's system message
    pub fn is_instruction(self) -> bool {
        matches!(self, Role::System | Role::Developer)
    }
}

/// A part of multimodal content
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    /// Images and any other non-text parts are dropped
    #[serde(other)]
    Other,
}

/// Message content as sent on the wire: a string, null, or a list of parts
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// Flatten message content to plain text
fn deserialize_content<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let content = Option::<WireContent>::deserialize(deserializer)?;
    Ok(match content {
        None => String::new(),
        Some(WireContent::Text(text)) => text,
        Some(WireContent::Parts(parts)) => parts
            .into_iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text),
                ContentPart::Other => None,
            })
            .collect(),
    })
}

/// Missing or null roles decode as `Unknown`, which the prompt skips
fn deserialize_role<'de, D>(deserializer: D) -> Result<Role, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Role>::deserialize(deserializer)?.unwrap_or(Role::Unknown))
}

/// A chat message
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ChatMessage {
    #[serde(default = "unknown_role", deserialize_with = "deserialize_role")]
    pub role: Role,
    #[serde(default, deserialize_with = "deserialize_content")]
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

/// Function call details within a tool call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallFunction {
    pub name: String,
    /// JSON-encoded arguments, kept as the caller sent them
    #[serde(default)]
    pub arguments: String,
}

/// A tool call made by the assistant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    pub function: ToolCallFunction,
}

fn unknown_role() -> Role {
    Role::Unknown
}

pub(crate) fn function_type() -> String {
    "function".to_string()
}

/// Function definition within a tool
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
}

/// Tool offered to the model
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

/// Chat completion request body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub tools: Vec<Tool>,
    /// Inline credential, used when no Authorization header is present
    #[serde(default)]
    pub api_key: Option<String>,
}
