//! Session handle backed by a runtime connection

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::json;

use super::connection::Connection;
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::{AssistantSession, EventReceiver};

pub struct CopilotSession {
    id: String,
    connection: Arc<Connection>,
    events: Mutex<Option<EventReceiver>>,
}

impl CopilotSession {
    pub(crate) fn new(id: String, connection: Arc<Connection>, events: EventReceiver) -> Self {
        Self {
            id,
            connection,
            events: Mutex::new(Some(events)),
        }
    }
}

#[async_trait]
impl AssistantSession for CopilotSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn subscribe(&self) -> RuntimeResult<EventReceiver> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(RuntimeError::AlreadySubscribed)
    }

    async fn send(&self, prompt: &str) -> RuntimeResult<()> {
        self.connection
            .request(
                "session.send",
                json!({"sessionId": self.id, "prompt": prompt}),
            )
            .await?;
        Ok(())
    }

    async fn destroy(&self) -> RuntimeResult<()> {
        self.connection.unregister_session(&self.id);
        self.connection
            .request("session.destroy", json!({"sessionId": self.id}))
            .await?;
        Ok(())
    }
}
