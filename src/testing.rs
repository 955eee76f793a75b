//! In-memory stand-ins for the API server and the metadata handler.

// System
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

// Third Party
use futures::{channel::mpsc as stream_mpsc, future::BoxFuture, stream, FutureExt, StreamExt};
use k8s_openapi::api::core::v1::{Endpoints, Namespace, Node, Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{error::ErrorResponse, ResourceExt};
use tokio::sync::mpsc;

// Local
use crate::cluster::{ClusterApi, FailureStatus, WatchItem, WatchStream};
use crate::envelope::{Envelope, EventType, ResourceKind, ResourceVersion, WatchedResource};
use crate::error::Error;
use crate::handler::MetadataHandler;
use crate::lister::{ResourceCollection, ResourceList};

pub(crate) fn object_meta(name: &str, resource_version: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some("default".to_string()),
        resource_version: Some(resource_version.to_string()),
        ..Default::default()
    }
}

pub(crate) fn named_pod(name: &str, resource_version: &str) -> Pod {
    Pod {
        metadata: object_meta(name, resource_version),
        ..Default::default()
    }
}

pub(crate) fn named_endpoints(name: &str, resource_version: &str) -> Endpoints {
    Endpoints {
        metadata: object_meta(name, resource_version),
        ..Default::default()
    }
}

pub(crate) fn data_item<K: WatchedResource>(object: K, event_type: EventType) -> WatchItem {
    WatchItem::Data {
        object: object.into_object(),
        event_type,
    }
}

pub(crate) fn failure_item(code: u16) -> WatchItem {
    WatchItem::Failure(FailureStatus {
        code,
        reason: "Test".to_string(),
        message: format!("failure status {}", code),
    })
}

pub(crate) fn api_error(code: u16) -> Error {
    Error::Kube(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("status {}", code),
        reason: "Test".to_string(),
        code,
    }))
}

/// The sending half of a scripted watch stream. Dropping it closes the stream.
pub(crate) struct FakeWatch {
    tx: stream_mpsc::UnboundedSender<WatchItem>,
}

impl FakeWatch {
    pub(crate) fn send(&self, item: WatchItem) {
        // The loop may already have dropped the stream during shutdown.
        let _ = self.tx.unbounded_send(item);
    }

    pub(crate) fn close(self) {}
}

#[derive(Default)]
struct FakeState {
    listings: HashMap<ResourceKind, VecDeque<Result<ResourceCollection, Error>>>,
    watches: HashMap<ResourceKind, VecDeque<Result<WatchStream, Error>>>,
    listed: Vec<ResourceKind>,
    opened: Vec<(ResourceKind, ResourceVersion)>,
    panicking: Vec<ResourceKind>,
    open_subscribers: Vec<mpsc::UnboundedSender<(ResourceKind, ResourceVersion)>>,
}

/// Scripted `ClusterApi`. Unscripted listings fail with a 503; unscripted watches open
/// and never yield anything.
#[derive(Clone, Default)]
pub(crate) struct FakeClusterApi {
    state: Arc<Mutex<FakeState>>,
}

impl FakeClusterApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_listing(&self, collection: ResourceCollection) {
        let mut state = self.state.lock().unwrap();
        state
            .listings
            .entry(collection.kind())
            .or_default()
            .push_back(Ok(collection));
    }

    pub(crate) fn fail_listing(&self, kind: ResourceKind) {
        let mut state = self.state.lock().unwrap();
        state
            .listings
            .entry(kind)
            .or_default()
            .push_back(Err(api_error(503)));
    }

    /// Script the next watch opened for `kind`.
    pub(crate) fn push_watch(&self, kind: ResourceKind) -> FakeWatch {
        let (tx, rx) = stream_mpsc::unbounded();
        let mut state = self.state.lock().unwrap();
        state
            .watches
            .entry(kind)
            .or_default()
            .push_back(Ok(rx.boxed()));
        FakeWatch { tx }
    }

    pub(crate) fn fail_watch(&self, kind: ResourceKind, error: Error) {
        let mut state = self.state.lock().unwrap();
        state.watches.entry(kind).or_default().push_back(Err(error));
    }

    /// Opening a watch for `kind` panics instead of returning.
    pub(crate) fn panic_on_watch(&self, kind: ResourceKind) {
        self.state.lock().unwrap().panicking.push(kind);
    }

    /// Every watch opened from now on is reported on the returned channel.
    pub(crate) fn subscribe_opens(
        &self,
    ) -> mpsc::UnboundedReceiver<(ResourceKind, ResourceVersion)> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().unwrap().open_subscribers.push(tx);
        rx
    }

    pub(crate) fn listed(&self) -> Vec<ResourceKind> {
        self.state.lock().unwrap().listed.clone()
    }

    pub(crate) fn opened(&self, kind: ResourceKind) -> Vec<ResourceVersion> {
        self.state
            .lock()
            .unwrap()
            .opened
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, version)| version.clone())
            .collect()
    }
}

impl ClusterApi for FakeClusterApi {
    fn list(&self, kind: ResourceKind) -> BoxFuture<'_, Result<ResourceCollection, Error>> {
        let result = {
            let mut state = self.state.lock().unwrap();
            state.listed.push(kind);
            state
                .listings
                .get_mut(&kind)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| Err(api_error(503)))
        };
        async move { result }.boxed()
    }

    fn watch(
        &self,
        kind: ResourceKind,
        resource_version: ResourceVersion,
    ) -> BoxFuture<'_, Result<WatchStream, Error>> {
        let result = {
            let mut state = self.state.lock().unwrap();
            state.opened.push((kind, resource_version.clone()));
            state
                .open_subscribers
                .retain(|tx| tx.send((kind, resource_version.clone())).is_ok());
            if state.panicking.contains(&kind) {
                None
            } else {
                Some(
                    state
                        .watches
                        .get_mut(&kind)
                        .and_then(VecDeque::pop_front)
                        .unwrap_or_else(|| Ok(stream::pending().boxed())),
                )
            }
        };
        // Panic after the lock is released so the state stays usable.
        async move {
            match result {
                Some(result) => result,
                None => panic!("watch for {} blew up", kind),
            }
        }
        .boxed()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SyncCall {
    pub(crate) kind: ResourceKind,
    pub(crate) names: Vec<String>,
    pub(crate) resource_version: ResourceVersion,
}

/// `MetadataHandler` that records every sync call and hands envelopes to the test.
pub(crate) struct RecordingHandler {
    syncs: Mutex<Vec<SyncCall>>,
    overrides: Mutex<HashMap<ResourceKind, ResourceVersion>>,
    tx: mpsc::Sender<Envelope>,
}

impl RecordingHandler {
    pub(crate) fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handler = Self {
            syncs: Mutex::new(Vec::new()),
            overrides: Mutex::new(HashMap::new()),
            tx,
        };
        (Arc::new(handler), rx)
    }

    /// Make the sync call for `kind` return `resource_version` instead of the listing's.
    pub(crate) fn override_version(&self, kind: ResourceKind, resource_version: ResourceVersion) {
        self.overrides
            .lock()
            .unwrap()
            .insert(kind, resource_version);
    }

    pub(crate) fn syncs(&self) -> Vec<SyncCall> {
        self.syncs.lock().unwrap().clone()
    }

    pub(crate) fn synced(&self, kind: ResourceKind) -> bool {
        self.syncs.lock().unwrap().iter().any(|call| call.kind == kind)
    }

    fn record<K: WatchedResource>(&self, list: ResourceList<K>) -> ResourceVersion {
        let names = list.items.iter().map(|item| item.name_any()).collect();
        self.syncs.lock().unwrap().push(SyncCall {
            kind: K::KIND,
            names,
            resource_version: list.resource_version.clone(),
        });
        self.overrides
            .lock()
            .unwrap()
            .get(&K::KIND)
            .cloned()
            .unwrap_or(list.resource_version)
    }
}

impl MetadataHandler for RecordingHandler {
    fn sync_namespace_data(&self, namespaces: ResourceList<Namespace>) -> ResourceVersion {
        self.record(namespaces)
    }

    fn sync_pod_data(&self, pods: ResourceList<Pod>) -> ResourceVersion {
        self.record(pods)
    }

    fn sync_endpoints_data(&self, endpoints: ResourceList<Endpoints>) -> ResourceVersion {
        self.record(endpoints)
    }

    fn sync_service_data(&self, services: ResourceList<Service>) -> ResourceVersion {
        self.record(services)
    }

    fn sync_node_data(&self, nodes: ResourceList<Node>) -> ResourceVersion {
        self.record(nodes)
    }

    fn ingestion_channel(&self) -> mpsc::Sender<Envelope> {
        self.tx.clone()
    }
}
