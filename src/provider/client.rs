//! REST client for the network provider API

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::crd::NamespaceNetwork;
use crate::drivers::{
    LbaasDriver, NamespaceRef, SecurityGroupsDriver, SelectorSet, ServiceSecurityGroupsDriver,
    SubnetsDriver, TenantNetworkLookup, TenantSubnet, VifPoolDriver,
};
use crate::error::{Error, Result};

#[derive(Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Deserialize)]
struct SubnetResponse {
    id: String,
    cidr: String,
}

#[derive(Deserialize)]
struct RouterInterfaceResponse {
    router_id: String,
}

#[derive(Deserialize)]
struct SecurityGroupsResponse {
    security_groups: Vec<String>,
}

#[derive(Deserialize)]
struct RulesResponse {
    #[serde(default)]
    selectors: SelectorSet,
}

pub struct ProviderClient {
    http: Client,
    base_url: String,
    router_id: String,
}

impl ProviderClient {
    pub fn new(base_url: &str, router_id: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            router_id: router_id.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    fn router(&self) -> Result<&str> {
        if self.router_id.is_empty() {
            return Err(Error::config("router_id is not configured"));
        }
        Ok(&self.router_id)
    }

    async fn rules(&self, namespace: &NamespaceRef, method: reqwest::Method) -> Result<SelectorSet> {
        let url = self.url(&format!("namespaces/{}/security-group-rules", namespace.name));
        let resp = self
            .http
            .request(method, &url)
            .json(&json!({ "labels": namespace.labels }))
            .send()
            .await?;
        let body: RulesResponse = expect_success(resp, &url).await?.json().await?;
        debug!(
            "Security-group rules of {} affect {} selector(s)",
            namespace.name,
            body.selectors.len()
        );
        Ok(body.selectors)
    }
}

async fn expect_success(resp: Response, what: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::provider(format!("HTTP {} from {}: {}", status, what, body)))
}

/// Deletion treats a missing resource as done and a conflict as not ready
async fn expect_deleted(resp: Response, what: &str) -> Result<()> {
    match resp.status() {
        StatusCode::NOT_FOUND => {
            debug!("{} already gone", what);
            Ok(())
        }
        StatusCode::CONFLICT => {
            let body = resp.text().await.unwrap_or_default();
            Err(Error::not_ready(format!("{} is still in use: {}", what, body)))
        }
        _ => expect_success(resp, what).await.map(|_| ()),
    }
}

fn service_path(service: &Service) -> String {
    format!(
        "{}/{}",
        service.namespace().unwrap_or_else(|| "default".to_string()),
        service.name_any()
    )
}

#[async_trait]
impl SubnetsDriver for ProviderClient {
    async fn create_network(&self, ns_name: &str, project_id: &str) -> Result<String> {
        let url = self.url("networks");
        let resp = self
            .http
            .post(&url)
            .json(&json!({ "name": format!("ns/{}-net", ns_name), "project_id": project_id }))
            .send()
            .await?;
        let network: IdResponse = expect_success(resp, &url).await?.json().await?;
        info!("Created network {} for namespace {}", network.id, ns_name);
        Ok(network.id)
    }

    async fn create_subnet(
        &self,
        ns_name: &str,
        project_id: &str,
        net_id: &str,
    ) -> Result<(String, String)> {
        let url = self.url("subnets");
        let resp = self
            .http
            .post(&url)
            .json(&json!({
                "name": format!("ns/{}-subnet", ns_name),
                "project_id": project_id,
                "network_id": net_id,
            }))
            .send()
            .await?;
        let subnet: SubnetResponse = expect_success(resp, &url).await?.json().await?;
        info!(
            "Created subnet {} ({}) for namespace {}",
            subnet.id, subnet.cidr, ns_name
        );
        Ok((subnet.id, subnet.cidr))
    }

    async fn add_subnet_to_router(&self, subnet_id: &str) -> Result<String> {
        let url = self.url(&format!("routers/{}/interfaces", self.router()?));
        let resp = self
            .http
            .post(&url)
            .json(&json!({ "subnet_id": subnet_id }))
            .send()
            .await?;
        let iface: RouterInterfaceResponse = expect_success(resp, &url).await?.json().await?;
        Ok(iface.router_id)
    }

    async fn delete_namespace_subnet(&self, network: &NamespaceNetwork) -> Result<()> {
        let status = network.status_or_default();

        if let (Some(router_id), Some(subnet_id)) = (&status.router_id, &status.subnet_id) {
            let url = self.url(&format!("routers/{}/interfaces/{}", router_id, subnet_id));
            let resp = self.http.delete(&url).send().await?;
            expect_deleted(resp, &url).await?;
        }

        if let Some(net_id) = &status.net_id {
            let url = self.url(&format!("networks/{}", net_id));
            let resp = self.http.delete(&url).send().await?;
            expect_deleted(resp, &url).await?;
            info!(
                "Deleted network {} of namespace {}",
                net_id, network.spec.ns_name
            );
        }
        Ok(())
    }
}

#[async_trait]
impl VifPoolDriver for ProviderClient {
    async fn delete_network_pools(&self, net_id: &str) -> Result<()> {
        let url = self.url("pools");
        let resp = self
            .http
            .delete(&url)
            .query(&[("network_id", net_id)])
            .send()
            .await?;
        expect_deleted(resp, &url).await
    }
}

#[async_trait]
impl SecurityGroupsDriver for ProviderClient {
    async fn get_security_groups(&self, namespace: &str, project_id: &str) -> Result<Vec<String>> {
        let url = self.url(&format!("namespaces/{}/security-groups", namespace));
        let resp = self
            .http
            .get(&url)
            .query(&[("project_id", project_id)])
            .send()
            .await?;
        let body: SecurityGroupsResponse = expect_success(resp, &url).await?.json().await?;
        Ok(body.security_groups)
    }

    async fn create_namespace_sg_rules(&self, namespace: &NamespaceRef) -> Result<SelectorSet> {
        self.rules(namespace, reqwest::Method::POST).await
    }

    async fn update_namespace_sg_rules(&self, namespace: &NamespaceRef) -> Result<SelectorSet> {
        self.rules(namespace, reqwest::Method::PUT).await
    }

    async fn delete_namespace_sg_rules(&self, namespace: &NamespaceRef) -> Result<SelectorSet> {
        self.rules(namespace, reqwest::Method::DELETE).await
    }
}

#[async_trait]
impl ServiceSecurityGroupsDriver for ProviderClient {
    async fn get_security_groups(
        &self,
        service: &Service,
        project_id: &str,
    ) -> Result<Vec<String>> {
        let url = self.url(&format!("services/{}/security-groups", service_path(service)));
        let resp = self
            .http
            .get(&url)
            .query(&[("project_id", project_id)])
            .send()
            .await?;
        let body: SecurityGroupsResponse = expect_success(resp, &url).await?.json().await?;
        Ok(body.security_groups)
    }
}

#[async_trait]
impl LbaasDriver for ProviderClient {
    async fn update_lbaas_sg(&self, service: &Service, security_groups: &[String]) -> Result<()> {
        let url = self.url(&format!(
            "loadbalancers/{}/security-groups",
            service_path(service)
        ));
        let resp = self
            .http
            .put(&url)
            .json(&json!({ "security_groups": security_groups }))
            .send()
            .await?;
        expect_success(resp, &url).await?;
        Ok(())
    }
}

#[async_trait]
impl TenantNetworkLookup for ProviderClient {
    async fn get_tenant_subnet(&self, subnet_id: &str) -> Result<TenantSubnet> {
        let url = self.url(&format!("subnets/{}", subnet_id));
        let resp = self.http.get(&url).send().await?;
        Ok(expect_success(resp, &url).await?.json().await?)
    }
}
