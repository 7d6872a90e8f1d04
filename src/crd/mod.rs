//! Custom Resource Definitions for the NsNet operator
//!
//! This module defines the Kubernetes CRD tracking per-namespace networks.

mod namespace_network;


pub use namespace_network::{NamespaceNetwork, NamespaceNetworkSpec, NamespaceNetworkStatus};
