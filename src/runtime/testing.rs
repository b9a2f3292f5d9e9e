//! Scripted runtime doubles for unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    AssistantSession, ClientFactory, EventReceiver, ModelInfo, RuntimeError, RuntimeResult,
    SessionClient, SessionConfig, SessionEvent,
};

/// Session that replays a fixed list of events once the prompt is sent.
///
/// The sender is kept alive after replay, so a script without a terminal
/// event never completes.
pub(crate) struct ScriptedSession {
    script: Vec<SessionEvent>,
    fail_send: bool,
    tx: Mutex<Option<mpsc::UnboundedSender<SessionEvent>>>,
    rx: Mutex<Option<EventReceiver>>,
    pub destroyed: Arc<AtomicUsize>,
    pub prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedSession {
    pub fn new(script: Vec<SessionEvent>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            script,
            fail_send: false,
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            destroyed: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing_send() -> Self {
        Self {
            fail_send: true,
            ..Self::new(vec![])
        }
    }

    /// Events are queued up front and the channel closes after them
    pub fn closing(script: Vec<SessionEvent>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        for event in script {
            let _ = tx.send(event);
        }
        Self {
            script: vec![],
            fail_send: false,
            tx: Mutex::new(None),
            rx: Mutex::new(Some(rx)),
            destroyed: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl AssistantSession for ScriptedSession {
    fn id(&self) -> &str {
        "scripted-session"
    }

    fn subscribe(&self) -> RuntimeResult<EventReceiver> {
        self.rx
            .lock()
            .unwrap()
            .take()
            .ok_or(RuntimeError::AlreadySubscribed)
    }

    async fn send(&self, prompt: &str) -> RuntimeResult<()> {
        if self.fail_send {
            return Err(RuntimeError::Closed);
        }
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(tx) = self.tx.lock().unwrap().as_ref() {
            for event in &self.script {
                let _ = tx.send(event.clone());
            }
        }
        Ok(())
    }

    async fn destroy(&self) -> RuntimeResult<()> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Client whose start can be made to fail
pub(crate) struct ScriptedClient {
    pub credential: String,
    pub fail_start: bool,
    pub started: AtomicUsize,
    pub stopped: AtomicUsize,
}

#[async_trait]
impl SessionClient for ScriptedClient {
    async fn start(&self) -> RuntimeResult<()> {
        // Widen the window for concurrent cold starts
        tokio::time::sleep(Duration::from_millis(10)).await;
        if self.fail_start {
            return Err(RuntimeError::Rpc {
                code: 401,
                message: "bad credentials".to_string(),
            });
        }
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> RuntimeResult<()> {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_session(
        &self,
        _config: &SessionConfig,
    ) -> RuntimeResult<Box<dyn AssistantSession>> {
        Ok(Box::new(ScriptedSession::new(vec![SessionEvent::Idle])))
    }

    async fn list_models(&self) -> RuntimeResult<Vec<ModelInfo>> {
        Ok(vec![ModelInfo {
            id: "gpt-4o".to_string(),
        }])
    }
}

/// Factory recording every client it builds
#[derive(Default)]
pub(crate) struct ScriptedFactory {
    pub rejected: Vec<String>,
    /// Number of builds, whatever the credential, whose start fails
    pub failing_builds: usize,
    pub clients: Mutex<Vec<Arc<ScriptedClient>>>,
}

impl ScriptedFactory {
    pub fn rejecting(credentials: &[&str]) -> Self {
        Self {
            rejected: credentials.iter().map(|c| c.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing_first(builds: usize) -> Self {
        Self {
            failing_builds: builds,
            ..Self::default()
        }
    }

    pub fn built(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    pub fn client(&self, index: usize) -> Arc<ScriptedClient> {
        Arc::clone(&self.clients.lock().unwrap()[index])
    }
}

impl ClientFactory for ScriptedFactory {
    fn build(&self, credential: &str) -> Arc<dyn SessionClient> {
        let mut clients = self.clients.lock().unwrap();
        let client = Arc::new(ScriptedClient {
            credential: credential.to_string(),
            fail_start: clients.len() < self.failing_builds
                || self.rejected.iter().any(|c| c == credential),
            started: AtomicUsize::new(0),
            stopped: AtomicUsize::new(0),
        });
        clients.push(Arc::clone(&client));
        client
    }
}
