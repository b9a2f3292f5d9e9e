//! Copilot Gateway - OpenAI-compatible chat completions over Copilot sessions
//!
//! This library maps OpenAI chat completion requests onto assistant sessions
//! of the Copilot runtime. It resolves the caller's credential, keeps one
//! runtime client per credential, translates requests into a session
//! configuration plus prompt, and renders session events back as JSON or
//! Server-Sent Events.

pub mod classify;
pub mod config;
pub mod credential;
pub mod error;
pub mod openai;
pub mod pool;
pub mod routes;
pub mod runtime;
pub mod server;
pub mod streaming;
pub mod translate;

use std::sync::Arc;

use anyhow::Result;

pub use crate::config::Config;
pub use crate::pool::{ClientPool, PoolError};
pub use crate::runtime::{ClientFactory, CopilotClientFactory};

use crate::runtime::copilot::ClientOptions;

/// Application state shared across all request handlers
pub struct AppState {
    pub config: Config,
    /// One runtime client per credential
    pub pool: Arc<ClientPool>,
}

impl AppState {
    /// Create the application state backed by the Copilot CLI.
    ///
    /// Starts the default client when a default credential is configured;
    /// failing to start it is a startup error.
    pub async fn new(config: Config) -> Result<Self> {
        let factory = Arc::new(CopilotClientFactory::new(ClientOptions {
            cli_path: config.cli_path.clone(),
            log_level: config.cli_log_level.clone(),
        }));

        let pool =
            ClientPool::with_default_credential(factory, config.default_credential.as_deref())
                .await?;

        Ok(Self::from_parts(config, Arc::new(pool)))
    }

    /// Create the application state from an existing pool
    pub fn from_parts(config: Config, pool: Arc<ClientPool>) -> Self {
        Self { config, pool }
    }
}
