//! Copilot CLI client
//!
//! Spawns the Copilot CLI in server mode and talks to it over stdio. One
//! client (and therefore one CLI process) exists per credential.

use std::ffi::{OsStr, OsString};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::connection::Connection;
use super::session::CopilotSession;
use crate::credential::fingerprint;
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::{AssistantSession, ClientFactory, ModelInfo, SessionClient, SessionConfig};

/// Environment variable the CLI reads its GitHub token from
pub const TOKEN_ENV_VAR: &str = "COPILOT_GITHUB_TOKEN";

/// How long the CLI gets to answer its first ping
const START_TIMEOUT: Duration = Duration::from_secs(30);

/// Process-level options shared by every client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Path or name of the `copilot` executable
    pub cli_path: String,
    /// Log level passed to the CLI
    pub log_level: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            cli_path: "copilot".to_string(),
            log_level: "error".to_string(),
        }
    }
}

/// Build the child environment for a credential.
///
/// The full ambient environment is kept and exactly one token entry is set.
/// Stripping the environment down to the token leaves the CLI without PATH
/// or HOME, and it then hangs on startup.
pub fn build_client_env(credential: &str) -> Vec<(OsString, OsString)> {
    let mut env: Vec<(OsString, OsString)> = std::env::vars_os()
        .filter(|(key, _)| key.as_os_str() != OsStr::new(TOKEN_ENV_VAR))
        .collect();
    env.push((TOKEN_ENV_VAR.into(), credential.into()));
    env
}

struct Running {
    child: Child,
    connection: Arc<Connection>,
    reader: JoinHandle<()>,
}

pub struct CopilotClient {
    options: ClientOptions,
    credential: String,
    running: Mutex<Option<Running>>,
}

impl CopilotClient {
    pub fn new(options: ClientOptions, credential: impl Into<String>) -> Self {
        Self {
            options,
            credential: credential.into(),
            running: Mutex::new(None),
        }
    }

    async fn connection(&self) -> RuntimeResult<Arc<Connection>> {
        let running = self.running.lock().await;
        match running.as_ref() {
            Some(running) if !running.connection.is_closed() => Ok(Arc::clone(&running.connection)),
            Some(_) => Err(RuntimeError::Closed),
            None => Err(RuntimeError::NotStarted),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.options.cli_path);
        command
            .arg("--server")
            .arg("--stdio")
            .arg("--log-level")
            .arg(&self.options.log_level)
            .env_clear()
            .envs(build_client_env(&self.credential))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl SessionClient for CopilotClient {
    async fn start(&self) -> RuntimeResult<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }

        let mut child = self.command().spawn().map_err(RuntimeError::Spawn)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RuntimeError::Protocol("Failed to capture runtime stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RuntimeError::Protocol("Failed to capture runtime stdout".to_string()))?;

        let (connection, reader) = Connection::spawn(stdout, Box::new(stdin));

        let ping = match timeout(START_TIMEOUT, connection.request("ping", json!({}))).await {
            Ok(result) => result,
            Err(_) => Err(RuntimeError::Protocol(
                "Timed out waiting for runtime to answer ping".to_string(),
            )),
        };

        if let Err(e) = ping {
            reader.abort();
            if let Err(kill_err) = child.kill().await {
                debug!(error = %kill_err, "Failed to kill runtime process");
            }
            return Err(e);
        }

        info!(
            credential = %fingerprint(&self.credential),
            pid = ?child.id(),
            "Copilot runtime started"
        );

        *running = Some(Running {
            child,
            connection,
            reader,
        });
        Ok(())
    }

    async fn stop(&self) -> RuntimeResult<()> {
        let Some(mut running) = self.running.lock().await.take() else {
            return Ok(());
        };

        running.reader.abort();
        match running.child.kill().await {
            Ok(()) => {
                debug!(credential = %fingerprint(&self.credential), "Copilot runtime stopped");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to stop Copilot runtime");
                Err(RuntimeError::Io(e))
            }
        }
    }

    async fn create_session(
        &self,
        config: &SessionConfig,
    ) -> RuntimeResult<Box<dyn AssistantSession>> {
        let connection = self.connection().await?;
        let result = connection
            .request("session.create", serde_json::to_value(config)?)
            .await?;

        let session_id = result
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                RuntimeError::Protocol("session.create returned no sessionId".to_string())
            })?
            .to_string();

        let events = connection.register_session(&session_id);
        debug!(session_id = %session_id, model = %config.model, "Session created");

        Ok(Box::new(CopilotSession::new(session_id, connection, events)))
    }

    async fn list_models(&self) -> RuntimeResult<Vec<ModelInfo>> {
        #[derive(Deserialize)]
        struct ModelList {
            #[serde(default)]
            models: Vec<ModelInfo>,
        }

        let connection = self.connection().await?;
        let result = connection.request("models.list", json!({})).await?;
        let list: ModelList = serde_json::from_value(result)?;
        Ok(list.models)
    }
}

/// Factory producing one `CopilotClient` per credential
#[derive(Debug, Clone, Default)]
pub struct CopilotClientFactory {
    options: ClientOptions,
}

impl CopilotClientFactory {
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }
}

impl ClientFactory for CopilotClientFactory {
    fn build(&self, credential: &str) -> Arc<dyn SessionClient> {
        Arc::new(CopilotClient::new(self.options.clone(), credential))
    }
}
