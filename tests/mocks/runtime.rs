//! Scripted assistant runtime
//!
//! Implements the runtime traits in-process. Every session created through a
//! `MockFactory` replays the factory's script once the prompt is sent, and
//! every observable side effect is recorded in a shared `RuntimeProbe`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use copilot_gateway::runtime::{
    AssistantSession, ClientFactory, EventReceiver, ModelInfo, RuntimeError, RuntimeResult,
    SessionClient, SessionConfig, SessionEvent,
};
use tokio::sync::mpsc;

/// Side effects observed across all clients of one factory
#[derive(Clone, Default)]
pub struct RuntimeProbe {
    pub clients_built: Arc<AtomicUsize>,
    pub clients_stopped: Arc<AtomicUsize>,
    pub sessions_destroyed: Arc<AtomicUsize>,
    pub credentials: Arc<Mutex<Vec<String>>>,
    pub configs: Arc<Mutex<Vec<SessionConfig>>>,
    pub prompts: Arc<Mutex<Vec<String>>>,
}

impl RuntimeProbe {
    pub fn destroyed(&self) -> usize {
        self.sessions_destroyed.load(Ordering::SeqCst)
    }

    pub fn built(&self) -> usize {
        self.clients_built.load(Ordering::SeqCst)
    }

    pub fn last_config(&self) -> SessionConfig {
        self.configs
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no session was created")
    }

    pub fn last_prompt(&self) -> String {
        self.prompts
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no prompt was sent")
    }

    /// Wait for background session teardown
    pub async fn wait_destroyed(&self, expected: usize) {
        for _ in 0..100 {
            if self.destroyed() >= expected {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(self.destroyed(), expected);
    }
}

/// Factory for scripted clients
#[derive(Clone, Default)]
pub struct MockFactory {
    script: Vec<SessionEvent>,
    rejected: Vec<String>,
    fail_create: bool,
    models: Vec<String>,
    pub probe: RuntimeProbe,
}

impl MockFactory {
    pub fn new(script: Vec<SessionEvent>) -> Self {
        Self {
            script,
            models: vec!["gpt-4o".to_string(), "claude-sonnet-4".to_string()],
            ..Self::default()
        }
    }

    /// Credentials whose client fails to start
    pub fn rejecting(mut self, credentials: &[&str]) -> Self {
        self.rejected = credentials.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Every session creation fails
    pub fn failing_sessions(mut self) -> Self {
        self.fail_create = true;
        self
    }
}

impl ClientFactory for MockFactory {
    fn build(&self, credential: &str) -> Arc<dyn SessionClient> {
        self.probe.clients_built.fetch_add(1, Ordering::SeqCst);
        self.probe
            .credentials
            .lock()
            .unwrap()
            .push(credential.to_string());

        Arc::new(MockClient {
            script: self.script.clone(),
            fail_start: self.rejected.iter().any(|c| c == credential),
            fail_create: self.fail_create,
            models: self.models.clone(),
            probe: self.probe.clone(),
        })
    }
}

struct MockClient {
    script: Vec<SessionEvent>,
    fail_start: bool,
    fail_create: bool,
    models: Vec<String>,
    probe: RuntimeProbe,
}

#[async_trait]
impl SessionClient for MockClient {
    async fn start(&self) -> RuntimeResult<()> {
        if self.fail_start {
            return Err(RuntimeError::Rpc {
                code: -32000,
                message: "authentication failed".to_string(),
            });
        }
        Ok(())
    }

    async fn stop(&self) -> RuntimeResult<()> {
        self.probe.clients_stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_session(
        &self,
        config: &SessionConfig,
    ) -> RuntimeResult<Box<dyn AssistantSession>> {
        if self.fail_create {
            return Err(RuntimeError::Protocol("session.create rejected".to_string()));
        }
        self.probe.configs.lock().unwrap().push(config.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Box::new(MockSession {
            script: self.script.clone(),
            tx,
            rx: Mutex::new(Some(rx)),
            probe: self.probe.clone(),
        }))
    }

    async fn list_models(&self) -> RuntimeResult<Vec<ModelInfo>> {
        Ok(self
            .models
            .iter()
            .map(|id| ModelInfo { id: id.clone() })
            .collect())
    }
}

/// Session replaying its script on send; the channel stays open afterwards
struct MockSession {
    script: Vec<SessionEvent>,
    tx: mpsc::UnboundedSender<SessionEvent>,
    rx: Mutex<Option<EventReceiver>>,
    probe: RuntimeProbe,
}

#[async_trait]
impl AssistantSession for MockSession {
    fn id(&self) -> &str {
        "mock-session"
    }

    fn subscribe(&self) -> RuntimeResult<EventReceiver> {
        self.rx
            .lock()
            .unwrap()
            .take()
            .ok_or(RuntimeError::AlreadySubscribed)
    }

    async fn send(&self, prompt: &str) -> RuntimeResult<()> {
        self.probe.prompts.lock().unwrap().push(prompt.to_string());
        for event in &self.script {
            let _ = self.tx.send(event.clone());
        }
        Ok(())
    }

    async fn destroy(&self) -> RuntimeResult<()> {
        self.probe.sessions_destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
