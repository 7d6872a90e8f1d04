//! Security-group drivers backed by static configuration
//!
//! These variants hand out the configured groups and leave rule management
//! to the provider defaults, so every rule operation is a no-op.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use tracing::debug;

use super::{NamespaceRef, SecurityGroupsDriver, SelectorSet, ServiceSecurityGroupsDriver};
use crate::error::{Error, Result};

fn configured_groups(groups: &[String]) -> Result<Vec<String>> {
    if groups.is_empty() {
        return Err(Error::config(
            "pod_security_groups is required by the default security-group driver",
        ));
    }
    Ok(groups.to_vec())
}

pub struct DefaultSecurityGroupsDriver {
    groups: Vec<String>,
}

impl DefaultSecurityGroupsDriver {
    pub fn new(groups: Vec<String>) -> Self {
        Self { groups }
    }
}

#[async_trait]
impl SecurityGroupsDriver for DefaultSecurityGroupsDriver {
    async fn get_security_groups(&self, _namespace: &str, _project_id: &str) -> Result<Vec<String>> {
        configured_groups(&self.groups)
    }

    async fn create_namespace_sg_rules(&self, namespace: &NamespaceRef) -> Result<SelectorSet> {
        debug!("Default driver does not create SG rules for namespace {}", namespace.name);
        Ok(SelectorSet::default())
    }

    async fn update_namespace_sg_rules(&self, namespace: &NamespaceRef) -> Result<SelectorSet> {
        debug!("Default driver does not update SG rules for namespace {}", namespace.name);
        Ok(SelectorSet::default())
    }

    async fn delete_namespace_sg_rules(&self, namespace: &NamespaceRef) -> Result<SelectorSet> {
        debug!("Default driver does not delete SG rules for namespace {}", namespace.name);
        Ok(SelectorSet::default())
    }
}

pub struct DefaultServiceSecurityGroupsDriver {
    groups: Vec<String>,
}

impl DefaultServiceSecurityGroupsDriver {
    pub fn new(groups: Vec<String>) -> Self {
        Self { groups }
    }
}

#[async_trait]
impl ServiceSecurityGroupsDriver for DefaultServiceSecurityGroupsDriver {
    async fn get_security_groups(
        &self,
        _service: &Service,
        _project_id: &str,
    ) -> Result<Vec<String>> {
        configured_groups(&self.groups)
    }
}
