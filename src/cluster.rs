// Third Party
use futures::{
    future::BoxFuture,
    stream::{self, BoxStream},
    FutureExt, StreamExt, TryStreamExt,
};
use k8s_openapi::api::core::v1::{Endpoints, Namespace, Node, Pod, Service};
use kube::{
    api::{Api, ListParams, WatchEvent, WatchParams},
    error::ErrorResponse,
    Client,
};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

// Local
use crate::envelope::{EventType, ResourceKind, ResourceObject, ResourceVersion, WatchedResource};
use crate::error::Error;
use crate::lister::{ResourceCollection, ResourceList};

/// Items buffered between a watch connection and the loop consuming it.
const WATCH_BUFFER: usize = 16;

/// A failure status reported inside a watch stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureStatus {
    pub code: u16,
    pub reason: String,
    pub message: String,
}

impl FailureStatus {
    /// The resource version the watch was opened at has been compacted away.
    pub fn is_gone(&self) -> bool {
        self.code == 410
    }
}

impl From<ErrorResponse> for FailureStatus {
    fn from(response: ErrorResponse) -> Self {
        Self {
            code: response.code,
            reason: response.reason,
            message: response.message,
        }
    }
}

impl From<kube::Error> for FailureStatus {
    fn from(error: kube::Error) -> Self {
        match error {
            kube::Error::Api(response) => response.into(),
            other => Self {
                code: 500,
                reason: "ClientError".to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// One item read from a watch stream.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchItem {
    Data {
        object: ResourceObject,
        event_type: EventType,
    },
    Bookmark(ResourceVersion),
    Failure(FailureStatus),
}

impl<K: WatchedResource> From<WatchEvent<K>> for WatchItem {
    fn from(event: WatchEvent<K>) -> Self {
        match event {
            WatchEvent::Added(object) => WatchItem::Data {
                object: object.into_object(),
                event_type: EventType::Added,
            },
            WatchEvent::Modified(object) => WatchItem::Data {
                object: object.into_object(),
                event_type: EventType::Modified,
            },
            WatchEvent::Deleted(object) => WatchItem::Data {
                object: object.into_object(),
                event_type: EventType::Deleted,
            },
            WatchEvent::Bookmark(bookmark) => {
                WatchItem::Bookmark(ResourceVersion::new(bookmark.metadata.resource_version))
            }
            WatchEvent::Error(response) => WatchItem::Failure(response.into()),
        }
    }
}

/// A watch stream. It ends when the server closes the connection.
pub type WatchStream = BoxStream<'static, WatchItem>;

/// The slice of the Kubernetes API the controller depends on.
pub trait ClusterApi: Send + Sync + 'static {
    /// Full, unfiltered listing of `kind` across all namespaces.
    fn list(&self, kind: ResourceKind) -> BoxFuture<'_, Result<ResourceCollection, Error>>;

    /// Open a watch on every object of `kind`, starting after `resource_version`.
    fn watch(
        &self,
        kind: ResourceKind,
        resource_version: ResourceVersion,
    ) -> BoxFuture<'_, Result<WatchStream, Error>>;
}

/// `ClusterApi` backed by a live API server.
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    pub fn new(client: &Client) -> Self {
        Self {
            client: client.clone(),
        }
    }

    async fn list_all<K: WatchedResource>(&self) -> Result<ResourceCollection, Error> {
        let api: Api<K> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        let resource_version = ResourceVersion::from(list.metadata.resource_version);
        Ok(K::into_collection(ResourceList::new(
            list.items,
            resource_version,
        )))
    }

    /// Opens the watch on a dedicated task that forwards events into a bounded channel,
    /// so the returned stream owns nothing borrowed. The task drops the connection as
    /// soon as the stream is dropped.
    async fn watch_all<K: WatchedResource>(
        &self,
        resource_version: ResourceVersion,
    ) -> Result<WatchStream, Error> {
        let api: Api<K> = Api::all(self.client.clone());
        let (opened_tx, opened_rx) = oneshot::channel();
        let (item_tx, item_rx) = mpsc::channel::<WatchItem>(WATCH_BUFFER);

        tokio::spawn(async move {
            let events = match api
                .watch(&WatchParams::default(), resource_version.watch_param())
                .await
            {
                Ok(events) => {
                    let _ = opened_tx.send(Ok(()));
                    events
                }
                Err(error) => {
                    let _ = opened_tx.send(Err(Error::from(error)));
                    return;
                }
            };
            futures::pin_mut!(events);
            loop {
                let item = tokio::select! {
                    _ = item_tx.closed() => break,
                    event = events.try_next() => match event {
                        Ok(Some(event)) => WatchItem::from(event),
                        Ok(None) => break,
                        Err(error) => WatchItem::Failure(error.into()),
                    },
                };
                if item_tx.send(item).await.is_err() {
                    break;
                }
            }
            debug!(kind = %K::KIND, "Watch connection closed");
        });

        match opened_rx.await {
            Ok(Ok(())) => Ok(receiver_stream(item_rx)),
            Ok(Err(error)) => Err(error),
            Err(_) => Err(Error::WatchClosed(K::KIND)),
        }
    }
}

fn receiver_stream(rx: mpsc::Receiver<WatchItem>) -> WatchStream {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}

impl ClusterApi for KubeClusterApi {
    fn list(&self, kind: ResourceKind) -> BoxFuture<'_, Result<ResourceCollection, Error>> {
        match kind {
            ResourceKind::Namespace => self.list_all::<Namespace>().boxed(),
            ResourceKind::Pod => self.list_all::<Pod>().boxed(),
            ResourceKind::Endpoint => self.list_all::<Endpoints>().boxed(),
            ResourceKind::Service => self.list_all::<Service>().boxed(),
            ResourceKind::Node => self.list_all::<Node>().boxed(),
        }
    }

    fn watch(
        &self,
        kind: ResourceKind,
        resource_version: ResourceVersion,
    ) -> BoxFuture<'_, Result<WatchStream, Error>> {
        match kind {
            ResourceKind::Namespace => self.watch_all::<Namespace>(resource_version).boxed(),
            ResourceKind::Pod => self.watch_all::<Pod>(resource_version).boxed(),
            ResourceKind::Endpoint => self.watch_all::<Endpoints>(resource_version).boxed(),
            ResourceKind::Service => self.watch_all::<Service>(resource_version).boxed(),
            ResourceKind::Node => self.watch_all::<Node>(resource_version).boxed(),
        }
    }
}
