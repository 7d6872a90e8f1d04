//! Controller module for NamespaceNetwork reconciliation
//! This module contains the controller loops, the provisioning engines
//! and the status store they persist progress through.

mod engine;
mod finalizers;
#[cfg(feature = "metrics")]
pub mod metrics;
mod namespace;
mod propagation;
mod reconciler;
#[cfg(test)]
mod reconciler_test;
mod status;

pub use engine::{pending_steps, NetworkEngine, ProvisionStep};
pub use finalizers::{has_finalizer, is_being_deleted};
pub use namespace::{
    new_network, run_namespace_controller, NamespaceHandler, TenantAnnotations,
    ROUTER_ID_ANNOTATION, SUBNET_ID_ANNOTATION,
};
pub use propagation::ServicePropagator;
pub use reconciler::{requeue_delay, run_controller, ControllerState, CONTROLLER_NAME};
pub use status::{
    finalizers_without, labels_merge_patch, KubeNetworkStore, NetworkCatalog, StatusStore,
};
