//! NamespaceNetwork Custom Resource Definition
//!
//! A NamespaceNetwork tracks the provider-side network of one cluster
//! namespace. The spec is written by the namespace controller; the status is
//! filled step by step by the provisioning engine so an interrupted pass can
//! resume where it stopped.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "netprov.io",
    version = "v1",
    kind = "NamespaceNetwork",
    namespaced,
    status = "NamespaceNetworkStatus",
    shortname = "nsnet",
    printcolumn = r#"{"name":"Namespace","type":"string","jsonPath":".spec.nsName"}"#,
    printcolumn = r#"{"name":"Network","type":"string","jsonPath":".status.netId"}"#,
    printcolumn = r#"{"name":"CIDR","type":"string","jsonPath":".status.subnetCIDR"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceNetworkSpec {
    pub ns_name: String,
    pub project_id: String,

    #[serde(default)]
    pub ns_labels: BTreeMap<String, String>,

    /// The namespace reuses a pre-existing tenant network instead of owning one
    #[serde(default, rename = "is_tenant", skip_serializing_if = "Option::is_none")]
    pub is_tenant: Option<bool>,
}

/// Provisioning progress. Filled strictly in order network, subnet, router.
///
/// Every field is optional so the same type doubles as a merge patch.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceNetworkStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,

    #[serde(rename = "subnetCIDR", skip_serializing_if = "Option::is_none")]
    pub subnet_cidr: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub router_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub populated: Option<bool>,

    /// Namespace labels observed by the last successful security-group sync
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ns_labels: Option<BTreeMap<String, String>>,
}

impl NamespaceNetworkSpec {
    pub fn is_tenant(&self) -> bool {
        self.is_tenant.unwrap_or(false)
    }
}

impl NamespaceNetworkStatus {
    pub fn network(net_id: impl Into<String>) -> Self {
        Self {
            net_id: Some(net_id.into()),
            ..Default::default()
        }
    }

    pub fn subnet(subnet_id: impl Into<String>, cidr: impl Into<String>) -> Self {
        Self {
            subnet_id: Some(subnet_id.into()),
            subnet_cidr: Some(cidr.into()),
            ..Default::default()
        }
    }

    /// Router attachment resets `populated`: the new subnet has no pooled ports yet
    pub fn router(router_id: impl Into<String>) -> Self {
        Self {
            router_id: Some(router_id.into()),
            populated: Some(false),
            ..Default::default()
        }
    }
}

impl NamespaceNetwork {
    /// Status of the resource, or an empty one for a fresh resource
    pub fn status_or_default(&self) -> NamespaceNetworkStatus {
        self.status.clone().unwrap_or_default()
    }

    /// Label set recorded at the last sync (empty when never synced)
    pub fn observed_labels(&self) -> BTreeMap<String, String> {
        self.status
            .as_ref()
            .and_then(|s| s.ns_labels.clone())
            .unwrap_or_default()
    }

    /// Whether the namespace labels changed since the last security-group sync
    pub fn labels_drifted(&self) -> bool {
        self.observed_labels() != self.spec.ns_labels
    }
}
