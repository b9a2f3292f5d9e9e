//! Per-credential client pool
//!
//! Holds one started runtime client per distinct credential for the life of
//! the process, plus an optional default client used when a request carries
//! no credential. Clients are never evicted; `shutdown_all` stops them all.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::credential::fingerprint;
use crate::routes::metrics::record_client_started;
use crate::runtime::{ClientFactory, RuntimeError, SessionClient};

/// Errors raised while resolving a client
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no API key provided")]
    NoCredential,

    #[error("failed to start copilot client: {0}")]
    Start(#[source] RuntimeError),
}

type ClientSlot = Arc<OnceCell<Arc<dyn SessionClient>>>;

pub struct ClientPool {
    factory: Arc<dyn ClientFactory>,
    default_client: Option<Arc<dyn SessionClient>>,
    clients: Mutex<HashMap<String, ClientSlot>>,
}

impl ClientPool {
    /// Create a pool without a default client
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            default_client: None,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Create a pool, starting the default client when a credential is given
    pub async fn with_default_credential(
        factory: Arc<dyn ClientFactory>,
        default_credential: Option<&str>,
    ) -> Result<Self, PoolError> {
        let mut pool = Self::new(factory);

        if let Some(credential) = default_credential.filter(|c| !c.is_empty()) {
            let client = pool.factory.build(credential);
            client.start().await.map_err(PoolError::Start)?;
            record_client_started();
            info!(credential = %fingerprint(credential), "Default client started");
            pool.default_client = Some(client);
        }

        Ok(pool)
    }

    pub fn has_default(&self) -> bool {
        self.default_client.is_some()
    }

    /// Number of per-credential clients that have started
    pub fn len(&self) -> usize {
        self.slots().values().filter(|slot| slot.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve the client governing a credential.
    ///
    /// An empty credential maps to the default client. Otherwise the cached
    /// client is returned, or a new one is built and started. The map lock is
    /// only held for lookups; the per-credential cell makes sure concurrent
    /// cold starts for one credential produce a single client.
    #[instrument(skip_all, fields(credential = %fingerprint(credential)))]
    pub async fn resolve_client(
        &self,
        credential: &str,
    ) -> Result<Arc<dyn SessionClient>, PoolError> {
        if credential.is_empty() {
            return self.default_client.clone().ok_or(PoolError::NoCredential);
        }

        let slot = Arc::clone(
            self.slots()
                .entry(credential.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        );

        let result = slot
            .get_or_try_init(|| async {
                let client = self.factory.build(credential);
                client.start().await.map_err(PoolError::Start)?;
                record_client_started();
                info!("Started client for credential");
                Ok::<_, PoolError>(client)
            })
            .await
            .map(Arc::clone);

        if let Err(e) = &result {
            warn!(error = %e, "Client start failed");
            self.forget_failed(credential, &slot);
        }

        result
    }

    /// Stop every cached client and the default client
    pub async fn shutdown_all(&self) {
        let mut clients: Vec<Arc<dyn SessionClient>> = self
            .slots()
            .values()
            .filter_map(|slot| slot.get().cloned())
            .collect();
        clients.extend(self.default_client.clone());

        info!(count = clients.len(), "Stopping backend clients");

        let results = join_all(clients.iter().map(|client| client.stop())).await;
        for result in results {
            if let Err(e) = result {
                warn!(error = %e, "Failed to stop client");
            }
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, ClientSlot>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop a slot whose start failed so rejected credentials don't pile up.
    ///
    /// A slot another request still holds stays put: that request may be
    /// retrying the start on it, and its client must remain reachable.
    fn forget_failed(&self, credential: &str, slot: &ClientSlot) {
        let mut slots = self.slots();
        // One reference from the map, one from the caller
        let stale = slots
            .get(credential)
            .map(|current| {
                Arc::ptr_eq(current, slot)
                    && !current.initialized()
                    && Arc::strong_count(current) <= 2
            })
            .unwrap_or(false);
        if stale {
            slots.remove(credential);
            debug!("Removed failed client slot");
        }
    }
}
