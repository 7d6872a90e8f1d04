//! Operator configuration
//!
//! Values come from an optional TOML file and can be overridden per field
//! through command line flags or environment variables.

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::drivers::SelectorSet;
use crate::error::{Error, Result};

/// Finalizer protecting NamespaceNetwork resources until teardown completes
pub const DEFAULT_FINALIZER: &str = "netprov.io/namespacenetwork-finalizer";

/// Handler name that turns on network-policy handling
pub const POLICY_HANDLER: &str = "policy";

/// Security-group driver variant, chosen once at startup
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SecurityGroupsDriverKind {
    /// Static groups from configuration, no rule management
    #[default]
    Default,
    /// Policy-aware rules managed by the provider
    Policy,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OperatorConfig {
    pub enabled_handlers: Vec<String>,
    pub pod_security_groups_driver: SecurityGroupsDriverKind,
    pub service_security_groups_driver: SecurityGroupsDriverKind,
    /// Load balancers enforce security-group rules of their members
    pub enforce_sg_rules: bool,
    pub pod_security_groups: Vec<String>,
    pub default_project_id: Option<String>,
    pub provider_url: String,
    pub router_id: String,
    pub provider_timeout_secs: u64,
    pub finalizer: String,
    pub metrics_addr: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            enabled_handlers: vec!["namespace".to_string(), "namespacenetwork".to_string()],
            pod_security_groups_driver: SecurityGroupsDriverKind::Default,
            service_security_groups_driver: SecurityGroupsDriverKind::Default,
            enforce_sg_rules: true,
            pod_security_groups: Vec::new(),
            default_project_id: None,
            provider_url: "http://localhost:9696".to_string(),
            router_id: String::new(),
            provider_timeout_secs: 30,
            finalizer: DEFAULT_FINALIZER.to_string(),
            metrics_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Command line / environment overrides for [`OperatorConfig`]
#[derive(Args, Debug, Default, Clone)]
pub struct ConfigArgs {
    /// Path to a TOML configuration file
    #[arg(long, env = "NSNET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Comma separated list of enabled handlers
    #[arg(long, env = "NSNET_ENABLED_HANDLERS", value_delimiter = ',')]
    pub enabled_handlers: Option<Vec<String>>,

    #[arg(long, env = "NSNET_POD_SG_DRIVER", value_enum)]
    pub pod_security_groups_driver: Option<SecurityGroupsDriverKind>,

    #[arg(long, env = "NSNET_SERVICE_SG_DRIVER", value_enum)]
    pub service_security_groups_driver: Option<SecurityGroupsDriverKind>,

    #[arg(long, env = "NSNET_ENFORCE_SG_RULES")]
    pub enforce_sg_rules: Option<bool>,

    /// Comma separated security groups of the default pod driver
    #[arg(long, env = "NSNET_POD_SECURITY_GROUPS", value_delimiter = ',')]
    pub pod_security_groups: Option<Vec<String>>,

    #[arg(long, env = "NSNET_PROJECT_ID")]
    pub default_project_id: Option<String>,

    /// Base URL of the network provider API
    #[arg(long, env = "NSNET_PROVIDER_URL")]
    pub provider_url: Option<String>,

    /// Router new subnets are attached to
    #[arg(long, env = "NSNET_ROUTER_ID")]
    pub router_id: Option<String>,

    /// Provider request timeout in seconds
    #[arg(long, env = "NSNET_PROVIDER_TIMEOUT")]
    pub provider_timeout_secs: Option<u64>,

    #[arg(long, env = "NSNET_FINALIZER")]
    pub finalizer: Option<String>,

    #[arg(long, env = "NSNET_METRICS_ADDR")]
    pub metrics_addr: Option<String>,
}

impl OperatorConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::config(format!("invalid config file: {}", e)))
    }

    /// Build the effective configuration: file first, then overrides
    pub fn load(args: &ConfigArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => {
                debug!("Loading configuration from {}", path.display());
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    Error::config(format!("cannot read {}: {}", path.display(), e))
                })?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };

        if let Some(handlers) = &args.enabled_handlers {
            config.enabled_handlers = handlers.clone();
        }
        if let Some(kind) = args.pod_security_groups_driver {
            config.pod_security_groups_driver = kind;
        }
        if let Some(kind) = args.service_security_groups_driver {
            config.service_security_groups_driver = kind;
        }
        if let Some(enforce) = args.enforce_sg_rules {
            config.enforce_sg_rules = enforce;
        }
        if let Some(groups) = &args.pod_security_groups {
            config.pod_security_groups = groups.clone();
        }
        if let Some(project) = &args.default_project_id {
            config.default_project_id = Some(project.clone());
        }
        if let Some(url) = &args.provider_url {
            config.provider_url = url.clone();
        }
        if let Some(router) = &args.router_id {
            config.router_id = router.clone();
        }
        if let Some(timeout) = args.provider_timeout_secs {
            config.provider_timeout_secs = timeout;
        }
        if let Some(finalizer) = &args.finalizer {
            config.finalizer = finalizer.clone();
        }
        if let Some(addr) = &args.metrics_addr {
            config.metrics_addr = addr.clone();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.finalizer.is_empty() {
            return Err(Error::config("finalizer must not be empty"));
        }
        if self.provider_url.is_empty() {
            return Err(Error::config("provider_url must not be empty"));
        }
        Ok(())
    }

    pub fn handler_enabled(&self, name: &str) -> bool {
        self.enabled_handlers.iter().any(|h| h == name)
    }
}

/// Whether security-group changes are pushed to dependent load balancers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NetworkPolicyGate {
    active: bool,
    enforce_sg_rules: bool,
}

impl NetworkPolicyGate {
    pub fn from_config(config: &OperatorConfig) -> Self {
        Self {
            active: config.handler_enabled(POLICY_HANDLER)
                && config.service_security_groups_driver == SecurityGroupsDriverKind::Policy,
            enforce_sg_rules: config.enforce_sg_rules,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn should_propagate(&self, selectors: &SelectorSet) -> bool {
        self.active && self.enforce_sg_rules && !selectors.is_empty()
    }
}
