//! Copilot CLI runtime
//!
//! JSON-RPC client for the Copilot CLI running in server mode.

pub mod client;
pub mod connection;
pub mod rpc;
pub mod session;

pub use client::{
    build_client_env, ClientOptions, CopilotClient, CopilotClientFactory, TOKEN_ENV_VAR,
};
pub use session::CopilotSession;
