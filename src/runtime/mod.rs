//! Assistant runtime abstraction layer
//!
//! Defines the trait interface for the external assistant runtime that owns
//! model execution. The gateway only creates sessions, sends one prompt per
//! session and consumes the resulting events.

pub mod copilot;
pub mod error;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use copilot::{CopilotClient, CopilotClientFactory};
pub use error::{RuntimeError, RuntimeResult};
pub use types::{
    InfiniteSessionConfig, ModelInfo, SessionConfig, SessionEvent, SystemMessageConfig,
    SystemMessageMode, ToolDefinition, ToolRequest,
};

/// Receiver half of a session's event channel
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// One assistant session, owned by the request that created it
///
/// Implementations MUST:
/// - Buffer events emitted before `subscribe` is called
/// - Close the event channel when the runtime connection goes away
#[async_trait]
pub trait AssistantSession: Send + Sync {
    /// Runtime-assigned session identifier
    fn id(&self) -> &str;

    /// Register the event observer.
    ///
    /// A session has exactly one observer; a second call fails with
    /// `RuntimeError::AlreadySubscribed`.
    fn subscribe(&self) -> RuntimeResult<EventReceiver>;

    /// Send the prompt for this turn
    async fn send(&self, prompt: &str) -> RuntimeResult<()>;

    /// Tear the session down on the runtime side
    async fn destroy(&self) -> RuntimeResult<()>;
}

/// Long-lived connection to the runtime, bound to one credential
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Start the client; may spawn processes or open connections
    async fn start(&self) -> RuntimeResult<()>;

    /// Stop the client and release its resources
    async fn stop(&self) -> RuntimeResult<()>;

    /// Create a fresh session
    async fn create_session(&self, config: &SessionConfig)
        -> RuntimeResult<Box<dyn AssistantSession>>;

    /// List models available to this client's credential
    async fn list_models(&self) -> RuntimeResult<Vec<ModelInfo>>;
}

/// Builds unstarted clients for a credential
pub trait ClientFactory: Send + Sync {
    fn build(&self, credential: &str) -> Arc<dyn SessionClient>;
}
