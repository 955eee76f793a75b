// System
use std::sync::Arc;

// Third Party
use k8s_openapi::api::core::v1::{Endpoints, Namespace, Node, Pod, Service};
use kube::Client;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

// Local
use kube_metadata_rs::{
    cluster::KubeClusterApi,
    config::ControllerConfig,
    envelope::WatchedResource,
    lister::ResourceList,
    utils::{init_tracing, setup_exit_hooks},
    Envelope, MetadataController, MetadataHandler, ResourceVersion,
};

/// Handler that logs every listing and change instead of storing them.
struct LoggingHandler {
    tx: mpsc::Sender<Envelope>,
}

impl LoggingHandler {
    fn new(capacity: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    fn sync<K: WatchedResource>(&self, list: ResourceList<K>) -> ResourceVersion {
        info!(
            kind = %K::KIND,
            count = list.items.len(),
            resource_version = %list.resource_version,
            "Initial state"
        );
        list.resource_version
    }
}

impl MetadataHandler for LoggingHandler {
    fn sync_namespace_data(&self, namespaces: ResourceList<Namespace>) -> ResourceVersion {
        self.sync(namespaces)
    }

    fn sync_pod_data(&self, pods: ResourceList<Pod>) -> ResourceVersion {
        self.sync(pods)
    }

    fn sync_endpoints_data(&self, endpoints: ResourceList<Endpoints>) -> ResourceVersion {
        self.sync(endpoints)
    }

    fn sync_service_data(&self, services: ResourceList<Service>) -> ResourceVersion {
        self.sync(services)
    }

    fn sync_node_data(&self, nodes: ResourceList<Node>) -> ResourceVersion {
        self.sync(nodes)
    }

    fn ingestion_channel(&self) -> mpsc::Sender<Envelope> {
        self.tx.clone()
    }
}

async fn drain(mut envelopes: mpsc::Receiver<Envelope>) {
    while let Some(envelope) = envelopes.recv().await {
        info!(
            kind = %envelope.kind,
            event_type = %envelope.event_type,
            name = %envelope.object.name(),
            namespace = ?envelope.object.namespace(),
            "Change"
        );
        match envelope.object.to_json() {
            Ok(raw) => debug!("{}", raw),
            Err(e) => error!("Could not serialize {}: {}", envelope.kind, e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    init_tracing(
        &["kube_metadata_rs", "metadata_controller"],
        tracing::Level::INFO,
    );
    let config = ControllerConfig::from_env()?;
    info!("Configuration: {:?}", config);

    let client = Client::try_default().await?;
    let (handler, envelopes) = LoggingHandler::new(config.ingestion_capacity);
    tokio::spawn(drain(envelopes));

    let controller = MetadataController::new(
        Arc::new(KubeClusterApi::new(&client)),
        Arc::new(handler),
        config,
    );
    setup_exit_hooks(controller.shutdown_token())?;

    controller.start().await;
    let failures = controller.wait().await;
    if !failures.is_empty() {
        for (kind, e) in &failures {
            error!("Watcher for {} failed: {}", kind, e);
        }
        anyhow::bail!("{} of the k8s watchers failed", failures.len());
    }
    info!("All k8s watchers stopped");
    Ok(())
}
