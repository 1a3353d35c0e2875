//! Agent-upgrade controller
//!
//! Rancher 2.0-2.4 deployed the cluster agent (Deployment) and node agent
//! (DaemonSet) into `cattle-system`. Agents from that range that still point
//! at this server are deleted; a higher-level controller recreates them with
//! a current image.
//!
//! The same predicate drives two independent watches, one per workload kind.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use regex::Regex;
use tracing::{debug, info, instrument};

#[cfg(test)]
use mockall::automock;

use super::{object_key, Context};
use crate::settings::ServerUrlSource;
use crate::Error;

/// Handler name registered for both workload watches
pub const AGENT_UPGRADE_CONTROLLER: &str = "agent-upgrade";

/// Namespace the Rancher agents run in
pub const AGENT_NAMESPACE: &str = "cattle-system";

/// Deployment name of the cluster agent
pub const CLUSTER_AGENT_NAME: &str = "cattle-cluster-agent";

/// DaemonSet name of the node agent
pub const NODE_AGENT_NAME: &str = "cattle-node-agent";

/// Agent image tags from v2.0.x through v2.4.x
pub const LEGACY_AGENT_IMAGE_PATTERN: &str = r"v2\.[0-4]\.";

/// Env var carrying the server URL an agent dials
pub const SERVER_URL_ENV: &str = "CATTLE_SERVER";

/// Workload kinds the agent-upgrade controller can delete
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkloadKind {
    /// apps/v1 Deployment
    Deployment,
    /// apps/v1 DaemonSet
    DaemonSet,
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deployment => write!(f, "Deployment"),
            Self::DaemonSet => write!(f, "DaemonSet"),
        }
    }
}

/// Trait abstracting workload deletion
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkloadClient: Send + Sync {
    /// Delete a namespaced workload of the given kind
    async fn delete_namespaced(
        &self,
        kind: WorkloadKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct KubeWorkloadClient {
    client: Client,
}

impl KubeWorkloadClient {
    /// Create a new KubeWorkloadClient wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WorkloadClient for KubeWorkloadClient {
    async fn delete_namespaced(
        &self,
        kind: WorkloadKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), Error> {
        let params = DeleteParams::default();
        match kind {
            WorkloadKind::Deployment => {
                let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
                api.delete(name, &params).await?;
            }
            WorkloadKind::DaemonSet => {
                let api: Api<DaemonSet> = Api::namespaced(self.client.clone(), namespace);
                api.delete(name, &params).await?;
            }
        }
        Ok(())
    }
}

/// Which workloads count as stale agents
///
/// Built once at registration and shared read-only by both watches.
#[derive(Clone, Debug)]
pub struct AgentUpgradePolicy {
    namespace: String,
    names: BTreeSet<String>,
    image_pattern: Regex,
    server_url_env: String,
}

impl AgentUpgradePolicy {
    /// Build a policy from explicit parts
    pub fn new(
        namespace: impl Into<String>,
        names: impl IntoIterator<Item = impl Into<String>>,
        image_pattern: &str,
        server_url_env: impl Into<String>,
    ) -> Result<Self, Error> {
        let image_pattern = Regex::new(image_pattern)
            .map_err(|e| Error::config(format!("invalid agent image pattern: {e}")))?;
        Ok(Self {
            namespace: namespace.into(),
            names: names.into_iter().map(Into::into).collect(),
            image_pattern,
            server_url_env: server_url_env.into(),
        })
    }

    /// The cluster and node agents shipped by Rancher v2.0-v2.4
    pub fn legacy_agents() -> Result<Self, Error> {
        Self::new(
            AGENT_NAMESPACE,
            [CLUSTER_AGENT_NAME, NODE_AGENT_NAME],
            LEGACY_AGENT_IMAGE_PATTERN,
            SERVER_URL_ENV,
        )
    }

    /// Decide whether a workload is a stale agent that must be deleted.
    ///
    /// Cheap metadata checks run first; the server URL is only resolved once
    /// the first container's image is known to be in the legacy range. Only
    /// the first container's image is inspected, but the env scan covers
    /// every container.
    pub fn should_delete(
        &self,
        meta: &ObjectMeta,
        template: &PodTemplateSpec,
        server_url: &dyn ServerUrlSource,
    ) -> bool {
        if meta.namespace.as_deref() != Some(self.namespace.as_str()) {
            return false;
        }

        match meta.name.as_deref() {
            Some(name) if self.names.contains(name) => {}
            _ => return false,
        }

        let containers = match template.spec.as_ref() {
            Some(spec) if !spec.containers.is_empty() => &spec.containers,
            _ => return false,
        };

        let image = containers
            .first()
            .and_then(|c| c.image.as_deref())
            .unwrap_or_default();
        if !self.image_pattern.is_match(image) {
            return false;
        }

        let url = server_url.current_server_url();
        containers
            .iter()
            .flat_map(|c| c.env.iter().flatten())
            .any(|env| {
                env.name == self.server_url_env && env.value.as_deref() == Some(url.as_str())
            })
    }
}

/// Deletes stale agent workloads
pub struct AgentUpgradeHandler {
    policy: Arc<AgentUpgradePolicy>,
    server_url: Arc<dyn ServerUrlSource>,
    workloads: Arc<dyn WorkloadClient>,
}

impl AgentUpgradeHandler {
    /// Create a handler from its collaborators
    pub fn new(
        policy: Arc<AgentUpgradePolicy>,
        server_url: Arc<dyn ServerUrlSource>,
        workloads: Arc<dyn WorkloadClient>,
    ) -> Self {
        Self {
            policy,
            server_url,
            workloads,
        }
    }

    /// Handle a Deployment event; `None` is a tombstone and is ignored
    pub async fn on_deployment_change(
        &self,
        key: &str,
        deploy: Option<&Deployment>,
    ) -> Result<Option<Deployment>, Error> {
        let Some(deploy) = deploy else {
            return Ok(None);
        };
        let template = deploy.spec.as_ref().map(|s| &s.template);
        self.handle(WorkloadKind::Deployment, key, &deploy.metadata, template)
            .await?;
        Ok(Some(deploy.clone()))
    }

    /// Handle a DaemonSet event; `None` is a tombstone and is ignored
    pub async fn on_daemon_set_change(
        &self,
        key: &str,
        ds: Option<&DaemonSet>,
    ) -> Result<Option<DaemonSet>, Error> {
        let Some(ds) = ds else {
            return Ok(None);
        };
        let template = ds.spec.as_ref().map(|s| &s.template);
        self.handle(WorkloadKind::DaemonSet, key, &ds.metadata, template)
            .await?;
        Ok(Some(ds.clone()))
    }

    async fn handle(
        &self,
        kind: WorkloadKind,
        key: &str,
        meta: &ObjectMeta,
        template: Option<&PodTemplateSpec>,
    ) -> Result<(), Error> {
        let stale = template
            .map(|t| self.policy.should_delete(meta, t, self.server_url.as_ref()))
            .unwrap_or(false);
        if !stale {
            debug!(%kind, key, "workload is not a stale agent");
            return Ok(());
        }

        let namespace = meta.namespace.as_deref().unwrap_or_default();
        let name = meta.name.as_deref().unwrap_or_default();
        info!(%kind, namespace, name, "deleting legacy agent so it is recreated");
        self.workloads.delete_namespaced(kind, namespace, name).await
    }
}

/// Reconcile a Deployment through the agent-upgrade handler
#[instrument(skip(deploy, ctx), fields(deployment = %deploy.name_any()))]
pub async fn reconcile_deployment(
    deploy: Arc<Deployment>,
    ctx: Arc<Context<AgentUpgradeHandler>>,
) -> Result<Action, Error> {
    let key = object_key(&deploy.metadata);
    ctx.handler
        .on_deployment_change(&key, Some(deploy.as_ref()))
        .await?;
    Ok(Action::await_change())
}

/// Reconcile a DaemonSet through the agent-upgrade handler
#[instrument(skip(ds, ctx), fields(daemon_set = %ds.name_any()))]
pub async fn reconcile_daemon_set(
    ds: Arc<DaemonSet>,
    ctx: Arc<Context<AgentUpgradeHandler>>,
) -> Result<Action, Error> {
    let key = object_key(&ds.metadata);
    ctx.handler.on_daemon_set_change(&key, Some(ds.as_ref())).await?;
    Ok(Action::await_change())
}
