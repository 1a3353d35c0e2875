//! Reconciliation handlers for Rancher agents and project bindings
//!
//! Each controller follows watch → predicate → action: a pure predicate
//! decides whether the observed object needs work, and at most one write is
//! issued per event. Retries belong to the controller runtime, driven by
//! [`error_policy`].

pub mod agent_upgrade;
pub mod service_account;

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use tracing::{debug, error};

use crate::Error;

pub use agent_upgrade::{
    reconcile_daemon_set, reconcile_deployment, AgentUpgradeHandler, AgentUpgradePolicy,
    KubeWorkloadClient, WorkloadClient, WorkloadKind,
};
pub use service_account::{
    reconcile_binding, BindingClient, KubeBindingClient, ServiceAccountBindingHandler,
};

/// Controller context shared across reconciliations of one watch
pub struct Context<H> {
    /// Handler holding the predicate and its store client
    pub handler: H,
    /// Delay before a failed reconciliation is retried
    pub requeue_after: Duration,
}

impl<H> Context<H> {
    /// Create a context around a handler
    pub fn new(handler: H, requeue_after: Duration) -> Self {
        Self {
            handler,
            requeue_after,
        }
    }
}

/// Error policy shared by all controllers
///
/// A delete or update that lost a race with the object's removal has nothing
/// left to converge, so not-found errors wait for the next change. Every
/// other failure is retried after the configured delay.
pub fn error_policy<K, H>(obj: Arc<K>, error: &Error, ctx: Arc<Context<H>>) -> Action
where
    K: Resource,
{
    if error.is_not_found() {
        debug!(
            object = %obj.name_any(),
            namespace = %obj.namespace().unwrap_or_default(),
            "object already gone, not retrying"
        );
        return Action::await_change();
    }

    error!(
        ?error,
        object = %obj.name_any(),
        namespace = %obj.namespace().unwrap_or_default(),
        "reconciliation failed"
    );
    Action::requeue(ctx.requeue_after)
}

/// Cache key of an object: `namespace/name`, or `name` when cluster-scoped
pub fn object_key(meta: &ObjectMeta) -> String {
    let name = meta.name.as_deref().unwrap_or_default();
    match meta.namespace.as_deref() {
        Some(ns) if !ns.is_empty() => format!("{ns}/{name}"),
        _ => name.to_string(),
    }
}
