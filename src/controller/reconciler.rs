//! Main reconciler for NamespaceNetwork resources
//!
//! Implements the controller pattern using kube-rs runtime.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use kube::{
    api::Api,
    client::Client,
    runtime::{
        controller::{Action, Controller},
        watcher::Config,
    },
    ResourceExt,
};
use tracing::{error, info, instrument, warn};

use super::engine::NetworkEngine;
use crate::crd::NamespaceNetwork;
use crate::error::{Error, PassOutcome, Result};

pub const CONTROLLER_NAME: &str = "namespacenetwork";

/// Shared state for the controller
pub struct ControllerState {
    pub client: Client,
    pub engine: NetworkEngine,
}

/// Main entry point to start the controller
pub async fn run_controller(state: Arc<ControllerState>) -> Result<()> {
    let networks: Api<NamespaceNetwork> = Api::all(state.client.clone());

    info!("Starting NamespaceNetwork controller");

    // Verify CRD exists
    match networks.list(&Default::default()).await {
        Ok(_) => info!("NamespaceNetwork CRD is available"),
        Err(e) => {
            error!(
                "NamespaceNetwork CRD not found. Please install the CRD first: {:?}",
                e
            );
            return Err(Error::ConfigError(
                "NamespaceNetwork CRD not installed".to_string(),
            ));
        }
    }

    Controller::new(networks, Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok(obj) => info!("Reconciled: {:?}", obj),
                Err(e) => error!("Reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

#[instrument(skip(obj, ctx), fields(name = %obj.name_any(), namespace = ?obj.namespace()))]
async fn reconcile(obj: Arc<NamespaceNetwork>, ctx: Arc<ControllerState>) -> Result<Action> {
    info!(
        "Reconciling NamespaceNetwork {}/{}",
        obj.namespace().unwrap_or_default(),
        obj.name_any()
    );

    let started = Instant::now();
    let result = ctx.engine.handle(&obj).await;

    #[cfg(feature = "metrics")]
    {
        super::metrics::observe_reconcile_duration_seconds(
            CONTROLLER_NAME,
            started.elapsed().as_secs_f64(),
        );
        if let Err(e) = &result {
            super::metrics::inc_reconcile_error(CONTROLLER_NAME, e.kind());
        }
    }
    #[cfg(not(feature = "metrics"))]
    let _ = started;

    result.map(|_| Action::await_change())
}

/// Delay before a failed pass is redelivered, `None` when it succeeded
pub fn requeue_delay(outcome: &PassOutcome) -> Option<Duration> {
    if outcome.is_done() {
        return None;
    }
    match outcome {
        PassOutcome::Retryable(_) => Some(Duration::from_secs(15)),
        _ => Some(Duration::from_secs(60)),
    }
}

pub(crate) fn error_policy(
    network: Arc<NamespaceNetwork>,
    error: &Error,
    _ctx: Arc<ControllerState>,
) -> Action {
    let outcome = PassOutcome::from(error.failure());
    match &outcome {
        PassOutcome::Retryable(reason) => {
            warn!("NamespaceNetwork {} not ready: {}", network.name_any(), reason)
        }
        _ => error!("Reconciliation error for {}: {:?}", network.name_any(), error),
    }

    match requeue_delay(&outcome) {
        Some(delay) => Action::requeue(delay),
        None => Action::await_change(),
    }
}
