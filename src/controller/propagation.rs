//! Propagation of security-group changes to load-balanced services

use std::sync::Arc;

use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use tracing::{debug, info, instrument, warn};

use crate::drivers::{
    service_matches_selectors, LbaasDriver, SelectorSet, ServiceCatalog,
    ServiceSecurityGroupsDriver,
};
use crate::error::{Error, Result};

/// Recomputes the security groups of services whose pods were affected
pub struct ServicePropagator {
    services: Arc<dyn ServiceCatalog>,
    service_security_groups: Arc<dyn ServiceSecurityGroupsDriver>,
    lbaas: Arc<dyn LbaasDriver>,
}

impl ServicePropagator {
    pub fn new(
        services: Arc<dyn ServiceCatalog>,
        service_security_groups: Arc<dyn ServiceSecurityGroupsDriver>,
        lbaas: Arc<dyn LbaasDriver>,
    ) -> Self {
        Self {
            services,
            service_security_groups,
            lbaas,
        }
    }

    /// List the current services and update the affected ones
    #[instrument(skip(self, selectors), fields(selectors = selectors.len()))]
    pub async fn propagate(&self, selectors: &SelectorSet, project_id: &str) -> Result<usize> {
        let services = self.services.list_services().await?;
        self.update_services(&services, selectors, project_id).await
    }

    /// Push recomputed security groups to every matching service
    ///
    /// A failing service does not stop the others; failures are collected
    /// and returned together once every service has been visited. Returns
    /// the number of services updated.
    pub async fn update_services(
        &self,
        services: &[Service],
        selectors: &SelectorSet,
        project_id: &str,
    ) -> Result<usize> {
        let mut updated = 0;
        let mut failed = Vec::new();

        for service in services {
            if !service_matches_selectors(service, selectors) {
                continue;
            }
            let key = format!(
                "{}/{}",
                service.namespace().unwrap_or_default(),
                service.name_any()
            );
            let result = self.update_service(service, project_id).await;
            #[cfg(feature = "metrics")]
            super::metrics::inc_service_sg_update(result.is_ok());
            match result {
                Ok(()) => {
                    debug!("Updated load balancer security groups of {}", key);
                    updated += 1;
                }
                Err(e) => {
                    warn!("Failed to update security groups of {}: {}", key, e);
                    failed.push(format!("{}: {}", key, e));
                }
            }
        }

        if !failed.is_empty() {
            return Err(Error::PropagationError { failed });
        }
        if updated > 0 {
            info!("Updated security groups of {} service(s)", updated);
        }
        Ok(updated)
    }

    async fn update_service(&self, service: &Service, project_id: &str) -> Result<()> {
        let groups = self
            .service_security_groups
            .get_security_groups(service, project_id)
            .await?;
        self.lbaas.update_lbaas_sg(service, &groups).await
    }
}
