//! Namespace controller
//!
//! Keeps one NamespaceNetwork per cluster namespace, named after the
//! namespace and living inside it, and mirrors namespace label changes into
//! its spec so the provisioning engine resyncs security groups.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::{
    api::{Api, ObjectMeta},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        watcher::Config,
    },
    ResourceExt,
};
use tracing::{debug, error, info, instrument, warn};

use super::reconciler::requeue_delay;
use super::status::{NetworkCatalog, StatusStore};
use crate::config::OperatorConfig;
use crate::crd::{NamespaceNetwork, NamespaceNetworkSpec, NamespaceNetworkStatus};
use crate::drivers::{DriverSet, ProjectDriver, TenantNetworkLookup};
use crate::error::{Error, PassOutcome, Result};

pub const SUBNET_ID_ANNOTATION: &str = "netprov.io/subnet-id";
pub const ROUTER_ID_ANNOTATION: &str = "netprov.io/router-id";

const CONTROLLER_NAME: &str = "namespace";

/// Subnet and router a tenant namespace was pre-provisioned with
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TenantAnnotations {
    pub subnet_id: String,
    pub router_id: String,
}

impl TenantAnnotations {
    /// Both annotations must be present for a namespace to be a tenant
    pub fn from_namespace(namespace: &Namespace) -> Option<Self> {
        let annotations = namespace.metadata.annotations.as_ref()?;
        Some(Self {
            subnet_id: annotations.get(SUBNET_ID_ANNOTATION)?.clone(),
            router_id: annotations.get(ROUTER_ID_ANNOTATION)?.clone(),
        })
    }
}

pub struct NamespaceHandler {
    catalog: Arc<dyn NetworkCatalog>,
    store: Arc<dyn StatusStore>,
    project: Arc<dyn ProjectDriver>,
    tenant_lookup: Arc<dyn TenantNetworkLookup>,
    finalizer: String,
}

impl NamespaceHandler {
    pub fn new(
        catalog: Arc<dyn NetworkCatalog>,
        store: Arc<dyn StatusStore>,
        drivers: &DriverSet,
        config: &OperatorConfig,
    ) -> Self {
        Self {
            catalog,
            store,
            project: drivers.project.clone(),
            tenant_lookup: drivers.tenant_lookup.clone(),
            finalizer: config.finalizer.clone(),
        }
    }

    /// Handle a namespace that was added or modified
    #[instrument(skip(self, namespace), fields(name = %namespace.name_any()))]
    pub async fn on_present(&self, namespace: &Namespace) -> Result<()> {
        if namespace.metadata.deletion_timestamp.is_some() {
            debug!("Namespace {} is being deleted, skipping", namespace.name_any());
            return Ok(());
        }

        let ns_name = namespace.name_any();
        let labels = namespace.labels().clone();

        match self.catalog.get_network(&ns_name).await? {
            Some(network) => self.update_labels(&network, &labels).await,
            None => self.add_network(namespace, &labels).await,
        }
    }

    async fn update_labels(
        &self,
        network: &NamespaceNetwork,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        if network.observed_labels() == *labels || network.spec.ns_labels == *labels {
            return Ok(());
        }
        debug!("Labels of namespace {} changed", network.spec.ns_name);
        self.catalog.patch_spec_labels(network, labels).await
    }

    async fn add_network(
        &self,
        namespace: &Namespace,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        let ns_name = namespace.name_any();

        let tenant = match TenantAnnotations::from_namespace(namespace) {
            Some(ids) => match self.tenant_lookup.get_tenant_subnet(&ids.subnet_id).await {
                Ok(subnet) => Some((ids, subnet)),
                Err(e) => {
                    warn!(
                        "Unable to look up tenant subnet {} of namespace {}: {}",
                        ids.subnet_id, ns_name, e
                    );
                    None
                }
            },
            None => None,
        };

        let project_id = match &tenant {
            Some((_, subnet)) => subnet.project_id.clone(),
            None => self.project.get_project(&ns_name).await?,
        };

        let network = new_network(
            &ns_name,
            &project_id,
            labels,
            &self.finalizer,
            tenant.is_some(),
        );
        let created = match self.catalog.create_network(&network).await {
            Ok(created) => created,
            Err(e) => {
                error!("Error creating NamespaceNetwork for {}: {}", ns_name, e);
                return Err(Error::not_ready(format!(
                    "NamespaceNetwork of {} not created yet: {}",
                    ns_name, e
                )));
            }
        };

        if let Some((ids, subnet)) = tenant {
            let status = NamespaceNetworkStatus {
                net_id: Some(subnet.network_id),
                subnet_id: Some(ids.subnet_id),
                subnet_cidr: Some(subnet.cidr),
                router_id: Some(ids.router_id),
                ..Default::default()
            };
            self.store.patch_status(&created, &status).await?;
            info!("Registered tenant network of namespace {}", ns_name);
        }
        Ok(())
    }
}

/// NamespaceNetwork for a namespace that has none yet
pub fn new_network(
    ns_name: &str,
    project_id: &str,
    labels: &BTreeMap<String, String>,
    finalizer: &str,
    is_tenant: bool,
) -> NamespaceNetwork {
    NamespaceNetwork {
        metadata: ObjectMeta {
            name: Some(ns_name.to_string()),
            namespace: Some(ns_name.to_string()),
            finalizers: Some(vec![finalizer.to_string()]),
            ..Default::default()
        },
        spec: NamespaceNetworkSpec {
            ns_name: ns_name.to_string(),
            project_id: project_id.to_string(),
            ns_labels: labels.clone(),
            is_tenant: is_tenant.then_some(true),
        },
        status: None,
    }
}

/// Run the namespace controller until shutdown
pub async fn run_namespace_controller(client: Client, handler: Arc<NamespaceHandler>) -> Result<()> {
    let namespaces: Api<Namespace> = Api::all(client);

    info!("Starting Namespace controller");

    Controller::new(namespaces, Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, handler)
        .for_each(|res| async move {
            match res {
                Ok(obj) => debug!("Reconciled namespace: {:?}", obj),
                Err(e) => error!("Namespace reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

async fn reconcile(namespace: Arc<Namespace>, handler: Arc<NamespaceHandler>) -> Result<Action> {
    let result = handler.on_present(&namespace).await;
    #[cfg(feature = "metrics")]
    if let Err(e) = &result {
        super::metrics::inc_reconcile_error(CONTROLLER_NAME, e.kind());
    }
    result.map(|_| Action::await_change())
}

fn error_policy(namespace: Arc<Namespace>, error: &Error, _handler: Arc<NamespaceHandler>) -> Action {
    error!(
        "{} reconciliation error for {}: {:?}",
        CONTROLLER_NAME,
        namespace.name_any(),
        error
    );
    match requeue_delay(&PassOutcome::from(error.failure())) {
        Some(delay) => Action::requeue(delay),
        None => Action::await_change(),
    }
}
