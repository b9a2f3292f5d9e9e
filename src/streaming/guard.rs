//! Scoped ownership of one assistant session

use std::sync::Arc;

use tracing::{debug, warn};

use crate::routes::metrics::{session_closed, session_opened};
use crate::runtime::AssistantSession;

/// Owns a session for the duration of one request.
///
/// `release` destroys the session. A guard dropped without being released
/// (panic, client gone mid-await) destroys it on a spawned task, so every
/// exit path tears the session down exactly once.
pub struct SessionGuard {
    session: Arc<dyn AssistantSession>,
    released: bool,
}

impl SessionGuard {
    pub fn new(session: Box<dyn AssistantSession>) -> Self {
        session_opened();
        Self {
            session: Arc::from(session),
            released: false,
        }
    }

    pub fn session(&self) -> &dyn AssistantSession {
        self.session.as_ref()
    }

    /// Destroy the session
    pub async fn release(mut self) {
        self.released = true;
        destroy(Arc::clone(&self.session)).await;
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(destroy(Arc::clone(&self.session)));
            }
            Err(_) => {
                warn!(session_id = %self.session.id(), "No runtime to destroy dropped session");
                session_closed();
            }
        }
    }
}

async fn destroy(session: Arc<dyn AssistantSession>) {
    match session.destroy().await {
        Ok(()) => debug!(session_id = %session.id(), "Session destroyed"),
        Err(e) => warn!(session_id = %session.id(), error = %e, "Failed to destroy session"),
    }
    session_closed();
}
