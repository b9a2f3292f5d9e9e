//! OpenAI chat completion wire types

pub mod response;
pub mod types;

pub use response::{
    ChatCompletionResponse, Choice, Delta, FinishReason, ModelData, ModelsResponse,
    ResponseMessage, StreamChoice, StreamChunk, ToolCallDelta, ToolCallFunctionDelta,
};
pub use types::{
    ChatCompletionRequest, ChatMessage, ContentPart, FunctionDefinition, Role, Tool, ToolCall,
    ToolCallFunction,
};
