//! Persistence of NamespaceNetwork progress
//!
//! Status patches are merge patches against the status subresource and are
//! flushed right after each provisioning step. A resource that vanished in
//! the meantime is not an error: the patch becomes a logged no-op.

use std::collections::BTreeMap;

use async_trait::async_trait;
use kube::{
    api::{Api, Patch, PatchParams, PostParams},
    Client, ResourceExt,
};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info};

#[cfg(test)]
use mockall::automock;

use crate::crd::{NamespaceNetwork, NamespaceNetworkStatus};
use crate::error::{Error, Result};

const FIELD_MANAGER: &str = "nsnet-operator";

/// Status and finalizer mutations issued by the engines
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Merge the set fields of `status` into the resource status
    async fn patch_status(
        &self,
        network: &NamespaceNetwork,
        status: &NamespaceNetworkStatus,
    ) -> Result<()>;

    /// Replace the label snapshot in the status with `labels`
    async fn patch_labels_field(
        &self,
        network: &NamespaceNetwork,
        labels: &BTreeMap<String, String>,
    ) -> Result<()>;

    async fn add_finalizer(&self, network: &NamespaceNetwork, finalizer: &str) -> Result<()>;

    async fn remove_finalizer(&self, network: &NamespaceNetwork, finalizer: &str) -> Result<()>;
}

/// Read/create access used by the namespace controller
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NetworkCatalog: Send + Sync {
    async fn get_network(&self, namespace: &str) -> Result<Option<NamespaceNetwork>>;

    async fn create_network(&self, network: &NamespaceNetwork) -> Result<NamespaceNetwork>;

    /// Replace `spec.nsLabels` with `labels`
    async fn patch_spec_labels(
        &self,
        network: &NamespaceNetwork,
        labels: &BTreeMap<String, String>,
    ) -> Result<()>;
}

/// Merge patch turning the `old` label map into `new`
///
/// Keys missing from `new` are sent as `null` so the merge removes them.
pub fn labels_merge_patch(
    old: &BTreeMap<String, String>,
    new: &BTreeMap<String, String>,
) -> Value {
    let mut patch: Map<String, Value> = new
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    for key in old.keys().filter(|k| !new.contains_key(*k)) {
        patch.insert(key.clone(), Value::Null);
    }
    Value::Object(patch)
}

/// Finalizer list without `finalizer`
pub fn finalizers_without(network: &NamespaceNetwork, finalizer: &str) -> Vec<String> {
    network
        .finalizers()
        .iter()
        .filter(|f| f.as_str() != finalizer)
        .cloned()
        .collect()
}

/// Kubernetes-backed store for NamespaceNetwork resources
pub struct KubeNetworkStore {
    client: Client,
}

impl KubeNetworkStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, network: &NamespaceNetwork) -> Api<NamespaceNetwork> {
        let namespace = network
            .namespace()
            .unwrap_or_else(|| network.spec.ns_name.clone());
        Api::namespaced(self.client.clone(), &namespace)
    }

    async fn patch(&self, network: &NamespaceNetwork, patch: Value, subresource: bool) -> Result<()> {
        let api = self.api(network);
        let name = network.name_any();
        debug!("Patching NamespaceNetwork {}: {}", name, patch);

        let params = PatchParams::apply(FIELD_MANAGER);
        let result = if subresource {
            api.patch_status(&name, &params, &Patch::Merge(&patch)).await
        } else {
            api.patch(&name, &params, &Patch::Merge(&patch)).await
        };

        match result {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!("NamespaceNetwork {} not found, skipping patch", name);
                Ok(())
            }
            Err(e) => {
                error!("Error updating NamespaceNetwork {}: {:?}", name, e);
                Err(Error::KubeError(e))
            }
        }
    }
}

#[async_trait]
impl StatusStore for KubeNetworkStore {
    async fn patch_status(
        &self,
        network: &NamespaceNetwork,
        status: &NamespaceNetworkStatus,
    ) -> Result<()> {
        self.patch(network, json!({ "status": status }), true).await
    }

    async fn patch_labels_field(
        &self,
        network: &NamespaceNetwork,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        let patch = labels_merge_patch(&network.observed_labels(), labels);
        self.patch(network, json!({ "status": { "nsLabels": patch } }), true)
            .await
    }

    async fn add_finalizer(&self, network: &NamespaceNetwork, finalizer: &str) -> Result<()> {
        let mut finalizers = finalizers_without(network, finalizer);
        finalizers.push(finalizer.to_string());
        self.patch(network, json!({ "metadata": { "finalizers": finalizers } }), false)
            .await?;
        info!("Added finalizer to NamespaceNetwork {}", network.name_any());
        Ok(())
    }

    async fn remove_finalizer(&self, network: &NamespaceNetwork, finalizer: &str) -> Result<()> {
        let finalizers = finalizers_without(network, finalizer);
        self.patch(network, json!({ "metadata": { "finalizers": finalizers } }), false)
            .await?;
        info!("Removed finalizer from NamespaceNetwork {}", network.name_any());
        Ok(())
    }
}

#[async_trait]
impl NetworkCatalog for KubeNetworkStore {
    async fn get_network(&self, namespace: &str) -> Result<Option<NamespaceNetwork>> {
        let api: Api<NamespaceNetwork> = Api::namespaced(self.client.clone(), namespace);
        match api.get(namespace).await {
            Ok(network) => Ok(Some(network)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => {
                error!("Failed to get NamespaceNetwork {}: {:?}", namespace, e);
                Err(e.into())
            }
        }
    }

    async fn create_network(&self, network: &NamespaceNetwork) -> Result<NamespaceNetwork> {
        let created = self
            .api(network)
            .create(&PostParams::default(), network)
            .await?;
        info!("Created NamespaceNetwork {}", created.name_any());
        Ok(created)
    }

    async fn patch_spec_labels(
        &self,
        network: &NamespaceNetwork,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        let patch = labels_merge_patch(&network.spec.ns_labels, labels);
        self.patch(network, json!({ "spec": { "nsLabels": patch } }), false)
            .await
    }
}
