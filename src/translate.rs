//! Request translation
//!
//! Turns an OpenAI chat completion request into a runtime session
//! configuration and a single prompt string. The runtime accepts one prompt
//! per turn, so the message history is linearized into a labelled transcript.

use crate::openai::{ChatCompletionRequest, ChatMessage, Role, Tool};
use crate::runtime::{
    InfiniteSessionConfig, SessionConfig, SystemMessageConfig, SystemMessageMode, ToolDefinition,
};

/// Separator between transcript entries and between system message parts
const SEPARATOR: &str = "\n\n";

/// Output of request translation
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedRequest {
    pub config: SessionConfig,
    pub prompt: String,
}

/// Translate a validated request
pub fn translate_request(request: &ChatCompletionRequest) -> TranslatedRequest {
    let tools = translate_tools(&request.tools);

    // Restrict the session to the caller's tools so built-in runtime tools
    // are never reachable from this API
    let available_tools = if tools.is_empty() {
        None
    } else {
        Some(tools.iter().map(|t| t.name.clone()).collect())
    };

    let config = SessionConfig {
        model: request.model.clone(),
        streaming: request.stream,
        tools,
        system_message: system_message(&request.messages),
        available_tools,
        infinite_sessions: InfiniteSessionConfig { enabled: false },
    };

    TranslatedRequest {
        config,
        prompt: build_prompt(&request.messages),
    }
}

/// Replace-mode system message built from every system and developer message
pub fn system_message(messages: &[ChatMessage]) -> Option<SystemMessageConfig> {
    let parts: Vec<&str> = messages
        .iter()
        .filter(|m| m.role.is_instruction())
        .map(|m| m.content.as_str())
        .collect();

    if parts.is_empty() {
        return None;
    }

    Some(SystemMessageConfig {
        mode: SystemMessageMode::Replace,
        content: parts.join(SEPARATOR),
    })
}

/// Render the non-system messages as a labelled transcript
pub fn build_prompt(messages: &[ChatMessage]) -> String {
    let mut lines = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg.role {
            Role::System | Role::Developer | Role::Unknown => {}
            Role::User => lines.push(format!("[User]: {}", msg.content)),
            Role::Assistant => {
                if !msg.content.is_empty() {
                    lines.push(format!("[Assistant]: {}", msg.content));
                }
                for call in &msg.tool_calls {
                    lines.push(format!(
                        "[Assistant called tool {} with args: {}]",
                        call.function.name, call.function.arguments
                    ));
                }
            }
            Role::Tool => lines.push(format!(
                "[Tool result for {}]: {}",
                msg.tool_call_id.as_deref().unwrap_or_default(),
                msg.content
            )),
        }
    }

    lines.join(SEPARATOR)
}

/// Definitions for every `function` tool; other tool types are dropped
pub fn translate_tools(tools: &[Tool]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .filter(|tool| tool.tool_type == "function")
        .map(|tool| ToolDefinition {
            name: tool.function.name.clone(),
            description: tool.function.description.clone().unwrap_or_default(),
            parameters: tool.function.parameters.clone(),
        })
        .collect()
}
