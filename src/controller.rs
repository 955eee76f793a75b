// System
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// Third Party
use futures::FutureExt;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

// Local
use crate::cluster::ClusterApi;
use crate::config::ControllerConfig;
use crate::envelope::ResourceKind;
use crate::error::Error;
use crate::handler::MetadataHandler;
use crate::lister::list_or_empty;
use crate::watcher::WatchLoop;

type WatcherOutcome = (ResourceKind, Result<(), Error>);

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Mirrors namespaces, pods, endpoints, services and nodes into a `MetadataHandler`.
///
/// `start` lists every kind, hands the listing to the handler, and then keeps one watch
/// loop per kind running until `stop`. Watch loops are owned by the controller; dropping
/// it aborts them.
pub struct MetadataController {
    api: Arc<dyn ClusterApi>,
    handler: Arc<dyn MetadataHandler>,
    config: ControllerConfig,
    shutdown: CancellationToken,
    started: AtomicBool,
    watchers: Mutex<JoinSet<WatcherOutcome>>,
}

impl MetadataController {
    pub fn new(
        api: Arc<dyn ClusterApi>,
        handler: Arc<dyn MetadataHandler>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            api,
            handler,
            config,
            shutdown: CancellationToken::new(),
            started: AtomicBool::new(false),
            watchers: Mutex::new(JoinSet::new()),
        }
    }

    /// A handle on the shutdown signal. Cancelling it is equivalent to `stop`.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Bootstrap every kind and launch its watch loop. Calling it again is a no-op.
    ///
    /// A kind's sync call always returns before its watch loop is spawned, so no
    /// envelope of that kind can reach the handler ahead of its listing.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Metadata controller already started");
            return;
        }

        let ingest = self.handler.ingestion_channel();
        let mut watchers = self.watchers.lock().await;
        for kind in ResourceKind::ALL {
            let collection = list_or_empty(self.api.as_ref(), kind).await;
            let count = collection.len();
            let resource_version = collection.sync_into(self.handler.as_ref());
            info!(
                kind = %kind,
                count,
                resource_version = %resource_version,
                "Synced, starting watcher"
            );

            let watch_loop = WatchLoop::new(
                kind,
                self.api.clone(),
                ingest.clone(),
                self.shutdown.clone(),
                self.config.retry_backoff,
            );
            // A panicking loop is still reported under its kind.
            let run = AssertUnwindSafe(watch_loop.run(resource_version)).catch_unwind();
            watchers.spawn(async move {
                let outcome = run.await.unwrap_or_else(|panic| {
                    Err(Error::WatcherPanicked(panic_message(panic.as_ref())))
                });
                (kind, outcome)
            });
        }
    }

    /// Signal every watch loop to stop. Returns immediately; use `wait` to block until
    /// the loops have exited.
    pub fn stop(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Stopping all k8s watchers...");
        }
        self.shutdown.cancel();
    }

    /// Wait for every watch loop to exit, returning the kinds whose loop failed.
    ///
    /// A failed loop leaves the other kinds running, so this only returns once `stop`
    /// has been called or every loop has failed.
    pub async fn wait(&self) -> Vec<(ResourceKind, Error)> {
        let mut watchers = self.watchers.lock().await;
        let mut failures = Vec::new();
        while let Some(joined) = watchers.join_next().await {
            match joined {
                Ok((kind, Ok(()))) => debug!(kind = %kind, "Watcher exited"),
                Ok((kind, Err(error))) => {
                    error!(kind = %kind, error = %error, "Watcher failed");
                    failures.push((kind, error));
                }
                // Panics are caught inside the task, so only an abort lands here.
                Err(join_error) => error!("Watcher task did not complete: {}", join_error),
            }
        }
        failures
    }
}
