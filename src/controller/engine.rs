//! Provisioning state machine for NamespaceNetwork resources
//!
//! A reconcile pass runs the pending steps of the pipeline
//! network -> subnet -> router, then resyncs namespace security-group rules.
//! Each completed step is persisted before the next one starts, so a pass
//! interrupted by an error resumes at the first incomplete step when the
//! notification is redelivered.
//!
//! A finalize pass tears down in reverse order and removes the finalizer
//! only once everything else succeeded.

use std::sync::Arc;

use kube::ResourceExt;
use tracing::{debug, error, info, instrument};

use super::finalizers::{has_finalizer, is_being_deleted};
use super::propagation::ServicePropagator;
use super::status::StatusStore;
use crate::config::{NetworkPolicyGate, OperatorConfig};
use crate::crd::{NamespaceNetwork, NamespaceNetworkStatus};
use crate::drivers::{
    DriverSet, NamespaceRef, SecurityGroupsDriver, SelectorSet, SubnetsDriver, VifPoolDriver,
};
use crate::error::{Error, Result};

/// One step of the provisioning pipeline, in execution order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProvisionStep {
    Network,
    Subnet,
    Router,
}

impl ProvisionStep {
    pub const ALL: [ProvisionStep; 3] = [
        ProvisionStep::Network,
        ProvisionStep::Subnet,
        ProvisionStep::Router,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionStep::Network => "network",
            ProvisionStep::Subnet => "subnet",
            ProvisionStep::Router => "router",
        }
    }

    fn is_recorded(&self, status: &NamespaceNetworkStatus) -> bool {
        match self {
            ProvisionStep::Network => status.net_id.is_some(),
            ProvisionStep::Subnet => status.subnet_id.is_some(),
            ProvisionStep::Router => status.router_id.is_some(),
        }
    }
}

/// Steps to run for a status snapshot
///
/// Everything from the first unrecorded step onwards: once a step runs,
/// every later step runs too, even if its field was already set, so
/// downstream artifacts always derive from the fresh upstream identifier.
pub fn pending_steps(status: &NamespaceNetworkStatus) -> Vec<ProvisionStep> {
    match ProvisionStep::ALL
        .iter()
        .position(|step| !step.is_recorded(status))
    {
        Some(first) => ProvisionStep::ALL[first..].to_vec(),
        None => Vec::new(),
    }
}

pub struct NetworkEngine {
    store: Arc<dyn StatusStore>,
    subnets: Arc<dyn SubnetsDriver>,
    vif_pool: Arc<dyn VifPoolDriver>,
    security_groups: Arc<dyn SecurityGroupsDriver>,
    gate: NetworkPolicyGate,
    /// Present only when the network-policy gate is active
    propagator: Option<ServicePropagator>,
    finalizer: String,
}

impl NetworkEngine {
    pub fn new(store: Arc<dyn StatusStore>, drivers: &DriverSet, config: &OperatorConfig) -> Self {
        let gate = NetworkPolicyGate::from_config(config);
        let propagator = gate.is_active().then(|| {
            ServicePropagator::new(
                drivers.services.clone(),
                drivers.service_security_groups.clone(),
                drivers.lbaas.clone(),
            )
        });
        debug!("Network policy handling active: {}", gate.is_active());

        Self {
            store,
            subnets: drivers.subnets.clone(),
            vif_pool: drivers.vif_pool.clone(),
            security_groups: drivers.security_groups.clone(),
            gate,
            propagator,
            finalizer: config.finalizer.clone(),
        }
    }

    pub fn finalizer(&self) -> &str {
        &self.finalizer
    }

    /// Route a notification to reconcile or finalize
    pub async fn handle(&self, network: &NamespaceNetwork) -> Result<()> {
        if is_being_deleted(network) {
            if has_finalizer(network, &self.finalizer) {
                return self.finalize(network).await;
            }
            debug!("NamespaceNetwork {} already finalized", network.name_any());
            return Ok(());
        }
        self.ensure_finalizer(network).await?;
        self.reconcile(network).await
    }

    pub async fn ensure_finalizer(&self, network: &NamespaceNetwork) -> Result<()> {
        if !has_finalizer(network, &self.finalizer) {
            self.store.add_finalizer(network, &self.finalizer).await?;
        }
        Ok(())
    }

    /// Drive the resource towards a fully provisioned network
    #[instrument(skip(self, network), fields(name = %network.name_any(), namespace = ?network.namespace()))]
    pub async fn reconcile(&self, network: &NamespaceNetwork) -> Result<()> {
        let spec = &network.spec;
        let status = network.status_or_default();
        if spec.is_tenant() && status.net_id.is_none() {
            // Tenant ids are written by the namespace controller right after creation
            return Err(Error::not_ready(format!(
                "tenant network of namespace {} not registered yet",
                spec.ns_name
            )));
        }
        let steps = pending_steps(&status);
        let cascaded = !steps.is_empty();

        let mut net_id = status.net_id.clone();
        let mut subnet_id = status.subnet_id.clone();

        for step in steps {
            debug!("Running {} step for namespace {}", step.as_str(), spec.ns_name);
            match step {
                ProvisionStep::Network => {
                    let id = self
                        .subnets
                        .create_network(&spec.ns_name, &spec.project_id)
                        .await?;
                    self.store
                        .patch_status(network, &NamespaceNetworkStatus::network(&id))
                        .await?;
                    net_id = Some(id);
                }
                ProvisionStep::Subnet => {
                    let net = net_id
                        .as_deref()
                        .ok_or_else(|| Error::provider("no network to create the subnet on"))?;
                    let (id, cidr) = self
                        .subnets
                        .create_subnet(&spec.ns_name, &spec.project_id, net)
                        .await?;
                    self.store
                        .patch_status(network, &NamespaceNetworkStatus::subnet(&id, cidr))
                        .await?;
                    subnet_id = Some(id);
                }
                ProvisionStep::Router => {
                    let subnet = subnet_id
                        .as_deref()
                        .ok_or_else(|| Error::provider("no subnet to attach to the router"))?;
                    let router_id = self.subnets.add_subnet_to_router(subnet).await?;
                    self.store
                        .patch_status(network, &NamespaceNetworkStatus::router(router_id))
                        .await?;
                }
            }
            #[cfg(feature = "metrics")]
            super::metrics::inc_provision_step(step.as_str());
        }

        if cascaded || network.labels_drifted() {
            self.sync_security_groups(network).await?;
        }
        Ok(())
    }

    /// Recompute namespace rules and record the label set they were built from
    async fn sync_security_groups(&self, network: &NamespaceNetwork) -> Result<()> {
        let namespace = NamespaceRef::from_network(network);
        let selectors = self
            .security_groups
            .update_namespace_sg_rules(&namespace)
            .await?;
        self.propagate(&selectors, &network.spec.project_id).await?;
        self.store
            .patch_labels_field(network, &network.spec.ns_labels)
            .await?;
        info!(
            "Security groups of namespace {} synced with its labels",
            namespace.name
        );
        Ok(())
    }

    async fn propagate(&self, selectors: &SelectorSet, project_id: &str) -> Result<()> {
        if let Some(propagator) = &self.propagator {
            if self.gate.should_propagate(selectors) {
                propagator.propagate(selectors, project_id).await?;
            }
        }
        Ok(())
    }

    /// Tear down provider resources and release the finalizer
    #[instrument(skip(self, network), fields(name = %network.name_any(), namespace = ?network.namespace()))]
    pub async fn finalize(&self, network: &NamespaceNetwork) -> Result<()> {
        debug!("Deleting NamespaceNetwork resources of {}", network.name_any());

        if let Some(net_id) = network.status.as_ref().and_then(|s| s.net_id.as_deref()) {
            self.vif_pool.delete_network_pools(net_id).await?;

            if !network.spec.is_tenant() {
                if let Err(e) = self.subnets.delete_namespace_subnet(network).await {
                    if e.is_retriable() {
                        debug!("Subnet of {} is not ready to be removed", network.spec.ns_name);
                    }
                    return Err(e);
                }
            }

            let namespace = NamespaceRef::from_network(network);
            let selectors = self
                .security_groups
                .delete_namespace_sg_rules(&namespace)
                .await?;
            self.propagate(&selectors, &network.spec.project_id).await?;
        }

        debug!("Removing finalizer from NamespaceNetwork {}", network.name_any());
        if let Err(e) = self.store.remove_finalizer(network, &self.finalizer).await {
            error!(
                "Error removing finalizer from NamespaceNetwork {}: {}",
                network.name_any(),
                e
            );
            return Err(e);
        }
        info!("NamespaceNetwork {} finalized", network.name_any());
        Ok(())
    }
}
