//! Prometheus metrics for the nsnet operator
//!
//! # Exported metrics
//! The `/metrics` endpoint (when built with `--features metrics`) exports the following metrics:
//! - `nsnet_reconcile_duration_seconds` (histogram): reconcile duration labeled by controller.
//! - `nsnet_reconcile_errors_total` (counter): reconcile errors labeled by controller and kind.
//! - `nsnet_provision_steps_total` (counter): completed provisioning steps labeled by step.
//! - `nsnet_service_sg_updates_total` (counter): load balancer security-group updates labeled by result.

use std::sync::atomic::AtomicU64;

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

/// Labels for operator reconcile metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ReconcileLabels {
    /// Controller name, e.g. "namespacenetwork"
    pub controller: String,
}

/// Labels for operator error metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    /// Controller name, e.g. "namespacenetwork"
    pub controller: String,
    /// Error kind, e.g. "kube", "not_ready", "provider"
    pub kind: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StepLabels {
    /// "network", "subnet" or "router"
    pub step: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ResultLabels {
    pub result: String, // "success" or "failed"
}

/// Histogram tracking reconcile duration (seconds)
pub static RECONCILE_DURATION_SECONDS: Lazy<Family<ReconcileLabels, Histogram>> = Lazy::new(|| {
    fn reconcile_histogram() -> Histogram {
        // 1ms .. ~32s across 16 buckets.
        Histogram::new(exponential_buckets(0.001, 2.0, 16))
    }

    Family::new_with_constructor(reconcile_histogram)
});

/// Counter tracking reconcile errors
pub static RECONCILE_ERRORS_TOTAL: Lazy<Family<ErrorLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

/// Counter tracking completed provisioning steps
pub static PROVISION_STEPS_TOTAL: Lazy<Family<StepLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

/// Counter tracking per-service security-group propagation
pub static SERVICE_SG_UPDATES_TOTAL: Lazy<Family<ResultLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();

    registry.register(
        "nsnet_reconcile_duration_seconds",
        "Duration of reconcile loops in seconds",
        RECONCILE_DURATION_SECONDS.clone(),
    );
    registry.register(
        "nsnet_reconcile_errors_total",
        "Total number of reconcile errors",
        RECONCILE_ERRORS_TOTAL.clone(),
    );
    registry.register(
        "nsnet_provision_steps_total",
        "Provisioning steps completed against the network provider",
        PROVISION_STEPS_TOTAL.clone(),
    );
    registry.register(
        "nsnet_service_sg_updates_total",
        "Load balancer security-group updates pushed to services",
        SERVICE_SG_UPDATES_TOTAL.clone(),
    );

    registry
});

/// Observe a reconcile duration in seconds.
pub fn observe_reconcile_duration_seconds(controller: &str, seconds: f64) {
    let labels = ReconcileLabels {
        controller: controller.to_string(),
    };
    RECONCILE_DURATION_SECONDS
        .get_or_create(&labels)
        .observe(seconds);
}

/// Increment the reconcile error counter.
pub fn inc_reconcile_error(controller: &str, kind: &str) {
    let labels = ErrorLabels {
        controller: controller.to_string(),
        kind: kind.to_string(),
    };
    RECONCILE_ERRORS_TOTAL.get_or_create(&labels).inc();
}

pub fn inc_provision_step(step: &str) {
    let labels = StepLabels {
        step: step.to_string(),
    };
    PROVISION_STEPS_TOTAL.get_or_create(&labels).inc();
}

pub fn inc_service_sg_update(success: bool) {
    let labels = ResultLabels {
        result: if success { "success" } else { "failed" }.to_string(),
    };
    SERVICE_SG_UPDATES_TOTAL.get_or_create(&labels).inc();
}
