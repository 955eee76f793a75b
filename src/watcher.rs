// System
use std::sync::Arc;

// Third Party
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{self, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// Local
use crate::cluster::{ClusterApi, WatchItem, WatchStream};
use crate::envelope::{Envelope, EventType, ResourceKind, ResourceVersion};
use crate::error::Error;

/// The state of one watch attempt. A retry builds a new session rather than reusing
/// this one.
struct WatchSession {
    resource_version: ResourceVersion,
    stream: WatchStream,
    shutdown: CancellationToken,
}

/// Where to pick up once the retry backoff has elapsed.
enum Resume {
    Watch(ResourceVersion),
    Relist,
}

enum WatchLoopState {
    OpenStream(ResourceVersion),
    Streaming(WatchSession),
    Retry(Resume),
    Relist,
    Stopped,
}

/// Keeps a watch on one resource kind alive until shutdown, forwarding every change
/// into the ingestion channel.
pub struct WatchLoop {
    kind: ResourceKind,
    api: Arc<dyn ClusterApi>,
    ingest: mpsc::Sender<Envelope>,
    shutdown: CancellationToken,
    retry_backoff: Duration,
}

impl WatchLoop {
    pub fn new(
        kind: ResourceKind,
        api: Arc<dyn ClusterApi>,
        ingest: mpsc::Sender<Envelope>,
        shutdown: CancellationToken,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            kind,
            api,
            ingest,
            shutdown,
            retry_backoff,
        }
    }

    /// Watch from `resource_version` until shutdown.
    ///
    /// Returns an error only when the watch cannot be opened at all, e.g. a malformed
    /// resource version or a request the API server will never accept. That ends this
    /// kind's loop and nothing else.
    pub async fn run(self, resource_version: ResourceVersion) -> Result<(), Error> {
        let mut state = WatchLoopState::OpenStream(resource_version);
        loop {
            state = match state {
                WatchLoopState::OpenStream(resource_version) => {
                    self.open_stream(resource_version).await?
                }
                WatchLoopState::Streaming(session) => self.stream(session).await,
                WatchLoopState::Retry(resume) => self.retry(resume).await,
                WatchLoopState::Relist => self.relist().await,
                WatchLoopState::Stopped => {
                    info!(kind = %self.kind, "Watcher stopped");
                    return Ok(());
                }
            };
        }
    }

    async fn open_stream(
        &self,
        resource_version: ResourceVersion,
    ) -> Result<WatchLoopState, Error> {
        if self.shutdown.is_cancelled() {
            return Ok(WatchLoopState::Stopped);
        }
        if let Err(error) = resource_version.validate() {
            error!(kind = %self.kind, error = %error, "Could not start watcher");
            return Err(error);
        }

        debug!(kind = %self.kind, resource_version = %resource_version, "Opening watch...");
        let opened = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Ok(WatchLoopState::Stopped),
            opened = self.api.watch(self.kind, resource_version.clone()) => opened,
        };

        match opened {
            Ok(stream) => Ok(WatchLoopState::Streaming(WatchSession {
                resource_version,
                stream,
                shutdown: self.shutdown.clone(),
            })),
            Err(error) if error.is_gone() => {
                warn!(
                    kind = %self.kind,
                    resource_version = %resource_version,
                    "Resource version expired, relisting"
                );
                Ok(WatchLoopState::Relist)
            }
            Err(error) if error.is_fatal_for_watch() => {
                error!(kind = %self.kind, error = %error, "Could not start watcher");
                Err(error)
            }
            Err(error) => {
                warn!(kind = %self.kind, error = %error, "Watch connection failed");
                Ok(WatchLoopState::Retry(Resume::Watch(resource_version)))
            }
        }
    }

    async fn stream(&self, mut session: WatchSession) -> WatchLoopState {
        loop {
            let item = tokio::select! {
                biased;
                _ = session.shutdown.cancelled() => return WatchLoopState::Stopped,
                item = session.stream.next() => item,
            };

            match item {
                Some(WatchItem::Data { object, event_type }) => {
                    if let Some(resource_version) = object.resource_version() {
                        session.resource_version = resource_version;
                    }
                    let envelope = Envelope::new(self.kind, object, event_type);
                    if !self.forward(envelope).await {
                        return WatchLoopState::Stopped;
                    }
                }
                Some(WatchItem::Bookmark(resource_version)) => {
                    session.resource_version = resource_version;
                }
                Some(WatchItem::Failure(status)) if status.is_gone() => {
                    warn!(
                        kind = %self.kind,
                        resource_version = %session.resource_version,
                        message = %status.message,
                        "Resource version expired, relisting"
                    );
                    return WatchLoopState::Relist;
                }
                Some(WatchItem::Failure(status)) => {
                    error!(
                        kind = %self.kind,
                        code = status.code,
                        reason = %status.reason,
                        message = %status.message,
                        "Failed to read from k8s watcher"
                    );
                }
                None => {
                    info!(kind = %self.kind, "k8s watcher channel closed, retrying");
                    return WatchLoopState::Retry(Resume::Watch(session.resource_version));
                }
            }
        }
    }

    async fn retry(&self, resume: Resume) -> WatchLoopState {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => WatchLoopState::Stopped,
            _ = time::sleep(self.retry_backoff) => match resume {
                Resume::Watch(resource_version) => WatchLoopState::OpenStream(resource_version),
                Resume::Relist => WatchLoopState::Relist,
            },
        }
    }

    /// Recover from an expired resource version: list everything again, push each
    /// listed object as a modification, and watch from the new listing's version.
    async fn relist(&self) -> WatchLoopState {
        let listed = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return WatchLoopState::Stopped,
            listed = self.api.list(self.kind) => listed,
        };

        match listed {
            Ok(collection) => {
                let (resource_version, objects) = collection.into_objects();
                info!(
                    kind = %self.kind,
                    count = objects.len(),
                    resource_version = %resource_version,
                    "Relisted"
                );
                for object in objects {
                    // Only a send that is already under way finishes after shutdown.
                    if self.shutdown.is_cancelled() {
                        debug!(kind = %self.kind, "Relist interrupted by shutdown");
                        return WatchLoopState::Stopped;
                    }
                    let envelope = Envelope::new(self.kind, object, EventType::Modified);
                    if !self.forward(envelope).await {
                        return WatchLoopState::Stopped;
                    }
                }
                WatchLoopState::OpenStream(resource_version)
            }
            Err(error) => {
                warn!(kind = %self.kind, error = %error, "Could not relist");
                WatchLoopState::Retry(Resume::Relist)
            }
        }
    }

    /// Blocks until the handler accepts the envelope. Returns false once the handler has
    /// dropped its end of the channel.
    async fn forward(&self, envelope: Envelope) -> bool {
        if self.ingest.send(envelope).await.is_err() {
            warn!(kind = %self.kind, "Ingestion channel closed");
            return false;
        }
        true
    }
}
