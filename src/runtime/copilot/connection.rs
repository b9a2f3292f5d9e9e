//! Multiplexed JSON-RPC connection to a runtime process
//!
//! A single reader task owns the inbound half. Replies are routed to the
//! waiting request by id; `session.event` notifications are routed to the
//! channel of the session they belong to.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::rpc::{self, Incoming, METHOD_NOT_FOUND};
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::{EventReceiver, SessionEvent};

/// Outbound half of the transport
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

type PendingReply = oneshot::Sender<RuntimeResult<Value>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Connection {
    writer: tokio::sync::Mutex<BoxedWriter>,
    pending: Mutex<HashMap<u64, PendingReply>>,
    sessions: Mutex<HashMap<String, mpsc::UnboundedSender<SessionEvent>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl Connection {
    /// Wrap a transport and start the reader task
    pub fn spawn<R>(reader: R, writer: BoxedWriter) -> (Arc<Self>, JoinHandle<()>)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let connection = Arc::new(Self {
            writer: tokio::sync::Mutex::new(writer),
            pending: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        });

        let task = tokio::spawn(Arc::clone(&connection).read_loop(BufReader::new(reader)));
        (connection, task)
    }

    /// Send a request and wait for its reply
    pub async fn request(&self, method: &str, params: Value) -> RuntimeResult<Value> {
        if self.is_closed() {
            return Err(RuntimeError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);

        // close() may have drained the table between the check and the insert
        if self.is_closed() {
            lock(&self.pending).remove(&id);
            return Err(RuntimeError::Closed);
        }

        if let Err(e) = self.write(&rpc::request(id, method, params)).await {
            lock(&self.pending).remove(&id);
            return Err(e);
        }

        rx.await.map_err(|_| RuntimeError::Closed)?
    }

    /// Open the event channel for a session
    pub fn register_session(&self, session_id: &str) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        if !self.is_closed() {
            lock(&self.sessions).insert(session_id.to_string(), tx);
        }
        rx
    }

    /// Stop routing events to a session
    pub fn unregister_session(&self, session_id: &str) {
        lock(&self.sessions).remove(session_id);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn write(&self, message: &Value) -> RuntimeResult<()> {
        let mut writer = self.writer.lock().await;
        rpc::write_message(&mut *writer, message).await
    }

    async fn read_loop<R>(self: Arc<Self>, mut reader: R)
    where
        R: AsyncBufRead + Unpin,
    {
        loop {
            match rpc::read_message(&mut reader).await {
                Ok(Some(message)) => self.dispatch(message).await,
                Ok(None) => {
                    debug!("Runtime connection reached EOF");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read from runtime");
                    break;
                }
            }
        }

        self.close();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let pending: Vec<PendingReply> = lock(&self.pending).drain().map(|(_, tx)| tx).collect();
        for tx in pending {
            let _ = tx.send(Err(RuntimeError::Closed));
        }

        // Dropping the senders closes every session's event stream
        lock(&self.sessions).clear();
    }

    async fn dispatch(&self, message: Value) {
        match Incoming::classify(message) {
            Ok(Incoming::Response { id, result }) => {
                let waiter = lock(&self.pending).remove(&id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(
                            result.map_err(|(code, message)| RuntimeError::Rpc { code, message }),
                        );
                    }
                    None => debug!(id, "Dropping reply for unknown request"),
                }
            }
            Ok(Incoming::Notification { method, params }) => {
                if method == "session.event" {
                    self.route_event(params);
                } else {
                    debug!(method = %method, "Ignoring runtime notification");
                }
            }
            Ok(Incoming::Request { id, method, .. }) => {
                debug!(method = %method, "Rejecting runtime-initiated request");
                let reply = rpc::error_response(
                    id,
                    METHOD_NOT_FOUND,
                    &format!("{} is not handled by the gateway", method),
                );
                if let Err(e) = self.write(&reply).await {
                    warn!(error = %e, "Failed to reply to runtime request");
                }
            }
            Err(e) => warn!(error = %e, "Discarding malformed runtime message"),
        }
    }

    fn route_event(&self, params: Value) {
        let session_id = params.get("sessionId").and_then(Value::as_str);
        let event = params.get("event");

        let (Some(session_id), Some(event)) = (session_id, event) else {
            warn!("session.event notification without sessionId or event");
            return;
        };

        let event_type = event.get("type").and_then(Value::as_str).unwrap_or_default();
        let data = event.get("data").cloned().unwrap_or(Value::Null);
        let event = SessionEvent::from_wire(event_type, data);

        match lock(&self.sessions).get(session_id) {
            Some(tx) => {
                let _ = tx.send(event);
            }
            None => debug!(session_id = %session_id, "Event for unknown session"),
        }
    }
}
