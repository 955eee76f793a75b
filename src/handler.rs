// Third Party
use k8s_openapi::api::core::v1::{Endpoints, Namespace, Node, Pod, Service};
use tokio::sync::mpsc;

// Local
use crate::envelope::{Envelope, ResourceVersion};
use crate::lister::ResourceList;

/// The downstream consumer that owns the metadata store.
///
/// Each `sync_*` entry point is called exactly once, at bootstrap, with the full listing
/// for its kind (empty if the listing failed). It returns the version watching should
/// resume from. After bootstrap every change arrives through `ingestion_channel`.
pub trait MetadataHandler: Send + Sync + 'static {
    fn sync_namespace_data(&self, namespaces: ResourceList<Namespace>) -> ResourceVersion;

    fn sync_pod_data(&self, pods: ResourceList<Pod>) -> ResourceVersion;

    fn sync_endpoints_data(&self, endpoints: ResourceList<Endpoints>) -> ResourceVersion;

    fn sync_service_data(&self, services: ResourceList<Service>) -> ResourceVersion;

    fn sync_node_data(&self, nodes: ResourceList<Node>) -> ResourceVersion;

    /// The single channel shared by every watch loop. It should be bounded: a full
    /// channel is what throttles ingestion from the API server.
    fn ingestion_channel(&self) -> mpsc::Sender<Envelope>;
}
