// System
use std::fmt::{self, Debug};

// Third Party
use k8s_openapi::api::core::v1::{Endpoints, Namespace, Node, Pod, Service};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;

// Local
use crate::error::Error;
use crate::lister::{ResourceCollection, ResourceList};

/// The resource kinds mirrored by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Namespace,
    Pod,
    Endpoint,
    Service,
    Node,
}

impl ResourceKind {
    /// Every kind, in bootstrap order.
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Namespace,
        ResourceKind::Pod,
        ResourceKind::Endpoint,
        ResourceKind::Service,
        ResourceKind::Node,
    ];

    /// The plural resource name used by the API server.
    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::Namespace => "namespaces",
            ResourceKind::Pod => "pods",
            ResourceKind::Endpoint => "endpoints",
            ResourceKind::Service => "services",
            ResourceKind::Node => "nodes",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plural())
    }
}

/// Opaque cursor handed out by the API server with every listing and watch event.
///
/// An empty version means there is no baseline to resume from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ResourceVersion(String);

impl ResourceVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn unset() -> Self {
        Self::default()
    }

    pub fn is_unset(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The version to pass to a watch request. Without a baseline the watch starts at
    /// "0", which makes the API server replay current state as `Added` events.
    pub fn watch_param(&self) -> &str {
        if self.is_unset() {
            "0"
        } else {
            &self.0
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self
            .0
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(Error::InvalidResourceVersion(self.0.clone()));
        }
        Ok(())
    }
}

impl fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unset() {
            f.write_str("<unset>")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<Option<String>> for ResourceVersion {
    fn from(version: Option<String>) -> Self {
        Self(version.unwrap_or_default())
    }
}

/// The kind of change carried by an `Envelope`, as classified by the watch stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::Added => "ADDED",
            EventType::Modified => "MODIFIED",
            EventType::Deleted => "DELETED",
        };
        f.write_str(name)
    }
}

/// A decoded object of one of the mirrored kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceObject {
    Namespace(Namespace),
    Pod(Pod),
    Endpoints(Endpoints),
    Service(Service),
    Node(Node),
}

macro_rules! with_object {
    ($object:expr, $inner:ident => $body:expr) => {
        match $object {
            ResourceObject::Namespace($inner) => $body,
            ResourceObject::Pod($inner) => $body,
            ResourceObject::Endpoints($inner) => $body,
            ResourceObject::Service($inner) => $body,
            ResourceObject::Node($inner) => $body,
        }
    };
}

impl ResourceObject {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceObject::Namespace(_) => ResourceKind::Namespace,
            ResourceObject::Pod(_) => ResourceKind::Pod,
            ResourceObject::Endpoints(_) => ResourceKind::Endpoint,
            ResourceObject::Service(_) => ResourceKind::Service,
            ResourceObject::Node(_) => ResourceKind::Node,
        }
    }

    pub fn name(&self) -> String {
        with_object!(self, o => o.name_any())
    }

    pub fn namespace(&self) -> Option<String> {
        with_object!(self, o => o.namespace())
    }

    pub fn resource_version(&self) -> Option<ResourceVersion> {
        with_object!(self, o => o.resource_version().map(ResourceVersion::new))
    }

    /// The raw API representation of the object.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        with_object!(self, o => serde_json::to_value(o))
    }
}

/// A typed k8s-openapi resource that the controller knows how to list and watch.
pub trait WatchedResource:
    Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Send + Sync + 'static
{
    const KIND: ResourceKind;

    fn into_object(self) -> ResourceObject;

    fn into_collection(list: ResourceList<Self>) -> ResourceCollection;
}

macro_rules! watched_resource {
    ($ty:ty, $kind:ident, $object:ident, $collection:ident) => {
        impl WatchedResource for $ty {
            const KIND: ResourceKind = ResourceKind::$kind;

            fn into_object(self) -> ResourceObject {
                ResourceObject::$object(self)
            }

            fn into_collection(list: ResourceList<Self>) -> ResourceCollection {
                ResourceCollection::$collection(list)
            }
        }
    };
}

watched_resource!(Namespace, Namespace, Namespace, Namespaces);
watched_resource!(Pod, Pod, Pod, Pods);
watched_resource!(Endpoints, Endpoint, Endpoints, Endpoints);
watched_resource!(Service, Service, Service, Services);
watched_resource!(Node, Node, Node, Nodes);

/// One change event handed to the metadata handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub kind: ResourceKind,
    pub object: ResourceObject,
    pub event_type: EventType,
}

impl Envelope {
    pub fn new(kind: ResourceKind, object: ResourceObject, event_type: EventType) -> Self {
        Self {
            kind,
            object,
            event_type,
        }
    }
}
