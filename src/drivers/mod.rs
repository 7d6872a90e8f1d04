//! Driver interfaces consumed by the provisioning engines
//!
//! Every collaborator the engines talk to sits behind a trait so concrete
//! variants can be picked from configuration at startup and swapped for
//! mocks in tests.

mod default_sg;
mod project;
mod selectors;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

use crate::config::{OperatorConfig, SecurityGroupsDriverKind};
use crate::crd::NamespaceNetwork;
use crate::error::Result;
use crate::provider::ProviderClient;

pub use default_sg::{DefaultSecurityGroupsDriver, DefaultServiceSecurityGroupsDriver};
pub use project::DefaultProjectDriver;
pub use selectors::{selector_matches, service_matches_selectors, KubeServiceCatalog};

/// Pod selectors affected by a security-group rule change
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SelectorSet(Vec<LabelSelector>);

impl SelectorSet {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabelSelector> {
        self.0.iter()
    }
}

impl From<Vec<LabelSelector>> for SelectorSet {
    fn from(selectors: Vec<LabelSelector>) -> Self {
        Self(selectors)
    }
}

/// The namespace as seen by the security-group drivers
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NamespaceRef {
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

impl NamespaceRef {
    /// Build the namespace view from the resource spec
    ///
    /// The spec label set mirrors the live namespace, and during teardown
    /// the namespace object may already be gone.
    pub fn from_network(network: &NamespaceNetwork) -> Self {
        Self {
            name: network.spec.ns_name.clone(),
            labels: network.spec.ns_labels.clone(),
        }
    }
}

/// Provider-side lookup result for a pre-existing tenant subnet
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TenantSubnet {
    pub network_id: String,
    pub cidr: String,
    pub project_id: String,
}

/// Network, subnet and router provisioning
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SubnetsDriver: Send + Sync {
    /// Create the namespace network, returning its id
    async fn create_network(&self, ns_name: &str, project_id: &str) -> Result<String>;

    /// Create a subnet on `net_id`, returning `(subnet_id, cidr)`
    async fn create_subnet(
        &self,
        ns_name: &str,
        project_id: &str,
        net_id: &str,
    ) -> Result<(String, String)>;

    /// Attach the subnet to the project router, returning the router id
    async fn add_subnet_to_router(&self, subnet_id: &str) -> Result<String>;

    /// Remove the namespace subnet and network.
    ///
    /// Fails with `Error::NotReady` while the subnet is still in use.
    async fn delete_namespace_subnet(&self, network: &NamespaceNetwork) -> Result<()>;
}

/// Pooled port management
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VifPoolDriver: Send + Sync {
    /// Release every pooled port bound to the network
    async fn delete_network_pools(&self, net_id: &str) -> Result<()>;
}

/// Namespace-level security-group management
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecurityGroupsDriver: Send + Sync {
    async fn get_security_groups(&self, namespace: &str, project_id: &str) -> Result<Vec<String>>;

    async fn create_namespace_sg_rules(&self, namespace: &NamespaceRef) -> Result<SelectorSet>;

    /// Recompute the rules after a label change, returning affected selectors
    async fn update_namespace_sg_rules(&self, namespace: &NamespaceRef) -> Result<SelectorSet>;

    async fn delete_namespace_sg_rules(&self, namespace: &NamespaceRef) -> Result<SelectorSet>;
}

/// Security groups of load-balanced services
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ServiceSecurityGroupsDriver: Send + Sync {
    async fn get_security_groups(&self, service: &Service, project_id: &str)
        -> Result<Vec<String>>;
}

/// Load balancer fronting a service
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LbaasDriver: Send + Sync {
    async fn update_lbaas_sg(&self, service: &Service, security_groups: &[String]) -> Result<()>;
}

/// Source of the services that may need their load balancer updated
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    async fn list_services(&self) -> Result<Vec<Service>>;
}

/// Resolves the project a namespace belongs to
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProjectDriver: Send + Sync {
    async fn get_project(&self, namespace: &str) -> Result<String>;
}

/// Looks up pre-existing tenant subnets on the provider
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TenantNetworkLookup: Send + Sync {
    async fn get_tenant_subnet(&self, subnet_id: &str) -> Result<TenantSubnet>;
}

/// Concrete drivers selected from configuration
#[derive(Clone)]
pub struct DriverSet {
    pub subnets: Arc<dyn SubnetsDriver>,
    pub vif_pool: Arc<dyn VifPoolDriver>,
    pub security_groups: Arc<dyn SecurityGroupsDriver>,
    pub service_security_groups: Arc<dyn ServiceSecurityGroupsDriver>,
    pub lbaas: Arc<dyn LbaasDriver>,
    pub services: Arc<dyn ServiceCatalog>,
    pub project: Arc<dyn ProjectDriver>,
    pub tenant_lookup: Arc<dyn TenantNetworkLookup>,
}

impl DriverSet {
    pub fn from_config(
        config: &OperatorConfig,
        client: kube::Client,
        provider: Arc<ProviderClient>,
    ) -> Self {
        let security_groups: Arc<dyn SecurityGroupsDriver> = match config.pod_security_groups_driver
        {
            SecurityGroupsDriverKind::Default => Arc::new(DefaultSecurityGroupsDriver::new(
                config.pod_security_groups.clone(),
            )),
            SecurityGroupsDriverKind::Policy => provider.clone(),
        };
        let service_security_groups: Arc<dyn ServiceSecurityGroupsDriver> =
            match config.service_security_groups_driver {
                SecurityGroupsDriverKind::Default => Arc::new(
                    DefaultServiceSecurityGroupsDriver::new(config.pod_security_groups.clone()),
                ),
                SecurityGroupsDriverKind::Policy => provider.clone(),
            };

        Self {
            subnets: provider.clone(),
            vif_pool: provider.clone(),
            security_groups,
            service_security_groups,
            lbaas: provider.clone(),
            services: Arc::new(KubeServiceCatalog::new(client)),
            project: Arc::new(DefaultProjectDriver::new(config.default_project_id.clone())),
            tenant_lookup: provider,
        }
    }
}
