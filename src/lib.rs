//! NsNet: Kubernetes operator for per-namespace provider networks
//!
//! This crate keeps one NamespaceNetwork custom resource per cluster
//! namespace and drives it through network, subnet and router provisioning
//! on an external network provider, keeping namespace security-group rules
//! and dependent load balancers in sync with namespace labels.

pub mod config;
pub mod controller;
pub mod crd;
pub mod drivers;
pub mod error;
pub mod provider;

#[cfg(feature = "rest-api")]
pub mod rest_api;

pub use crate::error::{Error, Result};
