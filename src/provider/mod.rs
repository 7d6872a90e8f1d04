//! Network provider adapter
//!
//! HTTP client for the external network-resource provider. It implements the
//! provisioning, pool, security-group and load-balancer driver traits.

mod client;

pub use client::ProviderClient;
