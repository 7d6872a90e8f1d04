//! End-to-end provisioning tests against in-memory collaborators
//!
//! These tests drive the public engine API through the whole lifecycle of a
//! NamespaceNetwork: creation, steady state, label change and deletion,
//! including a teardown that is retried while the subnet is still in use.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::ObjectMeta;
use nsnet_operator::config::{OperatorConfig, DEFAULT_FINALIZER};
use nsnet_operator::controller::{has_finalizer, NetworkEngine, StatusStore};
use nsnet_operator::crd::{NamespaceNetwork, NamespaceNetworkSpec, NamespaceNetworkStatus};
use nsnet_operator::drivers::{
    DriverSet, LbaasDriver, NamespaceRef, ProjectDriver, SecurityGroupsDriver, SelectorSet,
    ServiceCatalog, ServiceSecurityGroupsDriver, SubnetsDriver, TenantNetworkLookup,
    TenantSubnet, VifPoolDriver,
};
use nsnet_operator::{Error, Result};

/// Provider state kept by [`FakeCloud`]
#[derive(Default)]
struct CloudState {
    next_id: u32,
    networks: BTreeMap<String, String>,
    subnets: BTreeMap<String, String>,
    router_ports: Vec<String>,
    pools_released: Vec<String>,
    subnet_in_use: bool,
    provider_calls: usize,
    rule_syncs: usize,
}

impl CloudState {
    fn allocate(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }
}

/// In-memory network provider
#[derive(Default)]
struct FakeCloud {
    state: Mutex<CloudState>,
}

impl FakeCloud {
    fn with<T>(&self, f: impl FnOnce(&mut CloudState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }
}

#[async_trait]
impl SubnetsDriver for FakeCloud {
    async fn create_network(&self, ns_name: &str, _project_id: &str) -> Result<String> {
        Ok(self.with(|s| {
            s.provider_calls += 1;
            let id = s.allocate("net");
            s.networks.insert(id.clone(), ns_name.to_string());
            id
        }))
    }

    async fn create_subnet(
        &self,
        _ns_name: &str,
        _project_id: &str,
        net_id: &str,
    ) -> Result<(String, String)> {
        self.with(|s| {
            s.provider_calls += 1;
            if !s.networks.contains_key(net_id) {
                return Err(Error::provider(format!("network {} not found", net_id)));
            }
            let id = s.allocate("sub");
            let cidr = format!("10.0.{}.0/24", s.next_id);
            s.subnets.insert(id.clone(), net_id.to_string());
            Ok((id, cidr))
        })
    }

    async fn add_subnet_to_router(&self, subnet_id: &str) -> Result<String> {
        Ok(self.with(|s| {
            s.provider_calls += 1;
            s.router_ports.push(subnet_id.to_string());
            "router-1".to_string()
        }))
    }

    async fn delete_namespace_subnet(&self, network: &NamespaceNetwork) -> Result<()> {
        let status = network.status_or_default();
        self.with(|s| {
            s.provider_calls += 1;
            if s.subnet_in_use {
                return Err(Error::not_ready("subnet still has bound ports"));
            }
            if let Some(subnet) = &status.subnet_id {
                s.router_ports.retain(|p| p != subnet);
                s.subnets.remove(subnet);
            }
            if let Some(net) = &status.net_id {
                s.networks.remove(net);
            }
            Ok(())
        })
    }
}

#[async_trait]
impl VifPoolDriver for FakeCloud {
    async fn delete_network_pools(&self, net_id: &str) -> Result<()> {
        self.with(|s| s.pools_released.push(net_id.to_string()));
        Ok(())
    }
}

#[async_trait]
impl SecurityGroupsDriver for FakeCloud {
    async fn get_security_groups(&self, _namespace: &str, _project_id: &str) -> Result<Vec<String>> {
        Ok(vec!["sg-default".to_string()])
    }

    async fn create_namespace_sg_rules(&self, _namespace: &NamespaceRef) -> Result<SelectorSet> {
        Ok(SelectorSet::default())
    }

    async fn update_namespace_sg_rules(&self, _namespace: &NamespaceRef) -> Result<SelectorSet> {
        self.with(|s| s.rule_syncs += 1);
        Ok(SelectorSet::default())
    }

    async fn delete_namespace_sg_rules(&self, _namespace: &NamespaceRef) -> Result<SelectorSet> {
        Ok(SelectorSet::default())
    }
}

#[async_trait]
impl ServiceSecurityGroupsDriver for FakeCloud {
    async fn get_security_groups(&self, _service: &Service, _project_id: &str) -> Result<Vec<String>> {
        Ok(vec!["sg-default".to_string()])
    }
}

#[async_trait]
impl LbaasDriver for FakeCloud {
    async fn update_lbaas_sg(&self, _service: &Service, _security_groups: &[String]) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl ServiceCatalog for FakeCloud {
    async fn list_services(&self) -> Result<Vec<Service>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl ProjectDriver for FakeCloud {
    async fn get_project(&self, _namespace: &str) -> Result<String> {
        Ok("p1".to_string())
    }
}

#[async_trait]
impl TenantNetworkLookup for FakeCloud {
    async fn get_tenant_subnet(&self, subnet_id: &str) -> Result<TenantSubnet> {
        Err(Error::provider(format!("subnet {} not found", subnet_id)))
    }
}

/// In-memory status store holding a single resource
struct FakeStore {
    network: Mutex<NamespaceNetwork>,
}

impl FakeStore {
    fn new(network: NamespaceNetwork) -> Self {
        Self {
            network: Mutex::new(network),
        }
    }

    fn current(&self) -> NamespaceNetwork {
        self.network.lock().unwrap().clone()
    }

    fn update(&self, f: impl FnOnce(&mut NamespaceNetwork)) {
        f(&mut self.network.lock().unwrap());
    }
}

#[async_trait]
impl StatusStore for FakeStore {
    async fn patch_status(
        &self,
        _network: &NamespaceNetwork,
        patch: &NamespaceNetworkStatus,
    ) -> Result<()> {
        self.update(|n| {
            let status = n.status.get_or_insert_with(Default::default);
            let patch = patch.clone();
            status.net_id = patch.net_id.or(status.net_id.take());
            status.subnet_id = patch.subnet_id.or(status.subnet_id.take());
            status.subnet_cidr = patch.subnet_cidr.or(status.subnet_cidr.take());
            status.router_id = patch.router_id.or(status.router_id.take());
            status.populated = patch.populated.or(status.populated);
            status.ns_labels = patch.ns_labels.or(status.ns_labels.take());
        });
        Ok(())
    }

    async fn patch_labels_field(
        &self,
        _network: &NamespaceNetwork,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.update(|n| {
            n.status.get_or_insert_with(Default::default).ns_labels = Some(labels.clone());
        });
        Ok(())
    }

    async fn add_finalizer(&self, _network: &NamespaceNetwork, finalizer: &str) -> Result<()> {
        self.update(|n| {
            n.metadata
                .finalizers
                .get_or_insert_with(Vec::new)
                .push(finalizer.to_string())
        });
        Ok(())
    }

    async fn remove_finalizer(&self, _network: &NamespaceNetwork, finalizer: &str) -> Result<()> {
        self.update(|n| {
            if let Some(finalizers) = n.metadata.finalizers.as_mut() {
                finalizers.retain(|f| f != finalizer);
            }
        });
        Ok(())
    }
}

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn fresh_network() -> NamespaceNetwork {
    NamespaceNetwork {
        metadata: ObjectMeta {
            name: Some("ns1".to_string()),
            namespace: Some("ns1".to_string()),
            ..Default::default()
        },
        spec: NamespaceNetworkSpec {
            ns_name: "ns1".to_string(),
            project_id: "p1".to_string(),
            ns_labels: labels(&[("team", "a")]),
            is_tenant: None,
        },
        status: None,
    }
}

fn setup() -> (Arc<FakeCloud>, Arc<FakeStore>, NetworkEngine) {
    let cloud = Arc::new(FakeCloud::default());
    let store = Arc::new(FakeStore::new(fresh_network()));
    let drivers = DriverSet {
        subnets: cloud.clone(),
        vif_pool: cloud.clone(),
        security_groups: cloud.clone(),
        service_security_groups: cloud.clone(),
        lbaas: cloud.clone(),
        services: cloud.clone(),
        project: cloud.clone(),
        tenant_lookup: cloud.clone(),
    };
    let engine = NetworkEngine::new(store.clone(), &drivers, &OperatorConfig::default());
    (cloud, store, engine)
}

#[tokio::test]
async fn fresh_namespace_is_fully_provisioned() {
    let (cloud, store, engine) = setup();

    engine.handle(&store.current()).await.unwrap();

    let network = store.current();
    assert!(has_finalizer(&network, DEFAULT_FINALIZER));

    let status = network.status_or_default();
    let net_id = status.net_id.clone().unwrap();
    let subnet_id = status.subnet_id.clone().unwrap();
    assert!(status.subnet_cidr.is_some());
    assert_eq!(status.router_id.as_deref(), Some("router-1"));
    assert_eq!(status.populated, Some(false));
    assert_eq!(status.ns_labels, Some(labels(&[("team", "a")])));

    cloud.with(|s| {
        assert_eq!(s.networks.get(&net_id).map(String::as_str), Some("ns1"));
        assert_eq!(s.subnets.get(&subnet_id), Some(&net_id));
        assert_eq!(s.router_ports, vec![subnet_id.clone()]);
        assert_eq!(s.provider_calls, 3);
        assert_eq!(s.rule_syncs, 1);
    });
}

#[tokio::test]
async fn redelivery_of_provisioned_resource_is_a_noop() {
    let (cloud, store, engine) = setup();
    engine.handle(&store.current()).await.unwrap();
    let before = store.current().status;

    engine.handle(&store.current()).await.unwrap();
    engine.handle(&store.current()).await.unwrap();

    assert_eq!(store.current().status, before);
    cloud.with(|s| {
        assert_eq!(s.provider_calls, 3);
        assert_eq!(s.rule_syncs, 1);
    });
}

#[tokio::test]
async fn label_change_resyncs_rules_once() {
    let (cloud, store, engine) = setup();
    engine.handle(&store.current()).await.unwrap();

    store.update(|n| n.spec.ns_labels = labels(&[("team", "b")]));
    engine.handle(&store.current()).await.unwrap();
    engine.handle(&store.current()).await.unwrap();

    assert_eq!(
        store.current().status_or_default().ns_labels,
        Some(labels(&[("team", "b")]))
    );
    cloud.with(|s| {
        assert_eq!(s.rule_syncs, 2);
        assert_eq!(s.provider_calls, 3);
    });
}

#[tokio::test]
async fn deletion_waits_for_subnet_to_be_released() {
    let (cloud, store, engine) = setup();
    engine.handle(&store.current()).await.unwrap();
    let net_id = store.current().status_or_default().net_id.unwrap();

    store.update(|n| {
        n.metadata.deletion_timestamp = Some(Time(k8s_openapi::chrono::Utc::now()))
    });
    cloud.with(|s| s.subnet_in_use = true);

    let err = engine.handle(&store.current()).await.unwrap_err();
    assert!(err.is_retriable());
    assert!(has_finalizer(&store.current(), DEFAULT_FINALIZER));
    cloud.with(|s| assert!(s.networks.contains_key(&net_id)));

    cloud.with(|s| s.subnet_in_use = false);
    engine.handle(&store.current()).await.unwrap();

    assert!(!has_finalizer(&store.current(), DEFAULT_FINALIZER));
    cloud.with(|s| {
        assert!(s.networks.is_empty());
        assert!(s.subnets.is_empty());
        assert!(s.router_ports.is_empty());
        assert_eq!(s.pools_released, vec![net_id.clone(), net_id.clone()]);
    });

    // Finalizer gone: further notifications are ignored
    let calls = cloud.with(|s| s.provider_calls);
    engine.handle(&store.current()).await.unwrap();
    assert_eq!(cloud.with(|s| s.provider_calls), calls);
}
