//! Finalizer handling for NamespaceNetwork teardown
//!
//! The finalizer keeps a NamespaceNetwork around until its provider-side
//! network, pooled ports and security-group rules are gone. It is removed
//! by the finalize pass as its very last step.

use kube::ResourceExt;

use crate::crd::NamespaceNetwork;

/// Check if the resource is being deleted
///
/// A deletion timestamp indicates the user has requested deletion,
/// but finalizers are preventing the actual removal.
pub fn is_being_deleted(network: &NamespaceNetwork) -> bool {
    network.metadata.deletion_timestamp.is_some()
}

/// Check if the resource still carries `finalizer`
pub fn has_finalizer(network: &NamespaceNetwork, finalizer: &str) -> bool {
    network.finalizers().iter().any(|f| f == finalizer)
}
