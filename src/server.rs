//! HTTP serving with a bounded graceful drain

use std::future::{Future, IntoFuture};
use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{info, warn};

/// Serve `app` until `signal` resolves, then drain in-flight requests.
///
/// Draining stops after `drain_timeout`; open streams are cut rather than
/// allowed to hold the process for a full turn.
pub async fn serve<F>(
    listener: TcpListener,
    app: Router,
    signal: F,
    drain_timeout: Duration,
) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let draining = Arc::new(Notify::new());
    let trigger = Arc::clone(&draining);

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            trigger.notify_one();
        })
        .into_future();

    tokio::select! {
        result = server => {
            info!("In-flight requests drained");
            result
        }
        _ = async {
            draining.notified().await;
            tokio::time::sleep(drain_timeout).await;
        } => {
            warn!(
                timeout_secs = drain_timeout.as_secs(),
                "Timed out draining in-flight requests"
            );
            Ok(())
        }
    }
}
