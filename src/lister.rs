// Third Party
use k8s_openapi::api::core::v1::{Endpoints, Namespace, Node, Pod, Service};
use tracing::{debug, warn};

// Local
use crate::cluster::ClusterApi;
use crate::envelope::{ResourceKind, ResourceObject, ResourceVersion, WatchedResource};
use crate::handler::MetadataHandler;

/// The decoded result of a full listing of one kind, plus the version it was taken at.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceList<K> {
    pub items: Vec<K>,
    pub resource_version: ResourceVersion,
}

impl<K> ResourceList<K> {
    pub fn new(items: Vec<K>, resource_version: ResourceVersion) -> Self {
        Self {
            items,
            resource_version,
        }
    }

    /// A listing with no items and no baseline version.
    pub fn empty() -> Self {
        Self::new(Vec::new(), ResourceVersion::unset())
    }
}

impl<K> Default for ResourceList<K> {
    fn default() -> Self {
        Self::empty()
    }
}

/// A listing of any one of the mirrored kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceCollection {
    Namespaces(ResourceList<Namespace>),
    Pods(ResourceList<Pod>),
    Endpoints(ResourceList<Endpoints>),
    Services(ResourceList<Service>),
    Nodes(ResourceList<Node>),
}

impl ResourceCollection {
    pub fn empty(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Namespace => ResourceCollection::Namespaces(ResourceList::empty()),
            ResourceKind::Pod => ResourceCollection::Pods(ResourceList::empty()),
            ResourceKind::Endpoint => ResourceCollection::Endpoints(ResourceList::empty()),
            ResourceKind::Service => ResourceCollection::Services(ResourceList::empty()),
            ResourceKind::Node => ResourceCollection::Nodes(ResourceList::empty()),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceCollection::Namespaces(_) => ResourceKind::Namespace,
            ResourceCollection::Pods(_) => ResourceKind::Pod,
            ResourceCollection::Endpoints(_) => ResourceKind::Endpoint,
            ResourceCollection::Services(_) => ResourceKind::Service,
            ResourceCollection::Nodes(_) => ResourceKind::Node,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ResourceCollection::Namespaces(list) => list.items.len(),
            ResourceCollection::Pods(list) => list.items.len(),
            ResourceCollection::Endpoints(list) => list.items.len(),
            ResourceCollection::Services(list) => list.items.len(),
            ResourceCollection::Nodes(list) => list.items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resource_version(&self) -> &ResourceVersion {
        match self {
            ResourceCollection::Namespaces(list) => &list.resource_version,
            ResourceCollection::Pods(list) => &list.resource_version,
            ResourceCollection::Endpoints(list) => &list.resource_version,
            ResourceCollection::Services(list) => &list.resource_version,
            ResourceCollection::Nodes(list) => &list.resource_version,
        }
    }

    /// Splits the listing into its version and the listed objects.
    pub fn into_objects(self) -> (ResourceVersion, Vec<ResourceObject>) {
        fn split<K: WatchedResource>(
            list: ResourceList<K>,
        ) -> (ResourceVersion, Vec<ResourceObject>) {
            let objects = list.items.into_iter().map(K::into_object).collect();
            (list.resource_version, objects)
        }
        match self {
            ResourceCollection::Namespaces(list) => split(list),
            ResourceCollection::Pods(list) => split(list),
            ResourceCollection::Endpoints(list) => split(list),
            ResourceCollection::Services(list) => split(list),
            ResourceCollection::Nodes(list) => split(list),
        }
    }

    /// Hands the listing to the handler's synchronization entry point for its kind and
    /// returns the version the handler wants watching to resume from.
    pub fn sync_into(self, handler: &dyn MetadataHandler) -> ResourceVersion {
        match self {
            ResourceCollection::Namespaces(list) => handler.sync_namespace_data(list),
            ResourceCollection::Pods(list) => handler.sync_pod_data(list),
            ResourceCollection::Endpoints(list) => handler.sync_endpoints_data(list),
            ResourceCollection::Services(list) => handler.sync_service_data(list),
            ResourceCollection::Nodes(list) => handler.sync_node_data(list),
        }
    }
}

/// List every object of `kind` across all namespaces. A failed listing is not fatal to
/// the caller: it is logged and an empty collection with no baseline is returned.
pub async fn list_or_empty(api: &dyn ClusterApi, kind: ResourceKind) -> ResourceCollection {
    match api.list(kind).await {
        Ok(collection) => {
            debug!(
                kind = %kind,
                count = collection.len(),
                resource_version = %collection.resource_version(),
                "Listed resources"
            );
            collection
        }
        Err(error) => {
            warn!(kind = %kind, error = %error, "Could not list all {}", kind);
            ResourceCollection::empty(kind)
        }
    }
}
