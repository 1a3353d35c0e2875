//! Controller runner - binds each handler to its all-namespaces watch
//!
//! Each `build_*` function returns a Vec of boxed futures that can be composed
//! by the caller. This keeps controller construction pure and testable.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use crate::config::Config;
use crate::controller::agent_upgrade::AGENT_UPGRADE_CONTROLLER;
use crate::controller::service_account::PRTB_SERVICE_ACCOUNT_CONTROLLER;
use crate::controller::{
    error_policy, reconcile_binding, reconcile_daemon_set, reconcile_deployment,
    AgentUpgradeHandler, AgentUpgradePolicy, Context, KubeBindingClient, KubeWorkloadClient,
    ServiceAccountBindingHandler,
};
use crate::crd::ProjectRoleTemplateBinding;
use crate::settings::{ServerUrlSource, SettingServerUrl, StaticServerUrl};
use crate::Error;

/// A controller (or cache) future driven until shutdown
pub type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Where the agent-upgrade predicate reads the server URL from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerUrlPlan {
    /// Fixed by `--server-url`
    Static(String),
    /// Watched from the `server-url` Setting
    Setting,
}

/// Which controllers to start, derived from the configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerPlan {
    /// Server URL source for the agent-upgrade controllers, `None` when disabled
    pub agent_upgrade: Option<ServerUrlPlan>,
    /// Whether the ProjectRoleTemplateBinding ServiceAccount controller runs
    pub prtb_service_account: bool,
}

impl ControllerPlan {
    /// Validate `config` and decide what to run
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        config.validate()?;

        let agent_upgrade = (!config.disable_agent_upgrade).then(|| match &config.server_url {
            Some(url) => ServerUrlPlan::Static(url.clone()),
            None => ServerUrlPlan::Setting,
        });

        Ok(Self {
            agent_upgrade,
            prtb_service_account: !config.disable_prtb_service_account,
        })
    }
}

/// Build every enabled controller, plus the caches they read from
pub fn register(client: Client, config: &Config) -> Result<Vec<ControllerFuture>, Error> {
    let plan = ControllerPlan::from_config(config)?;
    let mut futures = Vec::new();

    match plan.agent_upgrade {
        Some(ServerUrlPlan::Static(url)) => {
            tracing::info!(server_url = %url, "Using static server URL");
            let source = Arc::new(StaticServerUrl::new(url));
            futures.extend(build_agent_upgrade_controllers(
                client.clone(),
                source,
                config,
            )?);
        }
        Some(ServerUrlPlan::Setting) => {
            let (source, reflector) =
                SettingServerUrl::watch(client.clone(), config.watch_timeout_secs);
            futures.push(reflector);
            let controllers =
                build_agent_upgrade_controllers(client.clone(), Arc::new(source.clone()), config)?;
            futures.push(start_after_ready(source, controllers));
        }
        None => {}
    }

    if plan.prtb_service_account {
        futures.extend(build_service_account_controllers(client, config));
    }

    Ok(futures)
}

/// Hold `controllers` back until the Setting cache has its first list.
///
/// Legacy agents seen while the cache is empty would be compared against an
/// empty URL, and the controllers never revisit an unchanged workload.
pub fn start_after_ready(
    source: SettingServerUrl,
    controllers: Vec<ControllerFuture>,
) -> ControllerFuture {
    Box::pin(async move {
        if let Err(e) = source.wait_until_ready().await {
            tracing::error!(
                error = %e,
                "server-url setting never synced, agent-upgrade not started"
            );
            return;
        }
        tracing::info!(server_url = %source.current_server_url(), "server-url setting cached");
        futures::future::join_all(controllers).await;
    })
}

/// Build agent-upgrade controller futures (Deployment and DaemonSet)
pub fn build_agent_upgrade_controllers(
    client: Client,
    server_url: Arc<dyn ServerUrlSource>,
    config: &Config,
) -> Result<Vec<ControllerFuture>, Error> {
    let policy = Arc::new(AgentUpgradePolicy::legacy_agents()?);
    let workloads = Arc::new(KubeWorkloadClient::new(client.clone()));
    let ctx = Arc::new(Context::new(
        AgentUpgradeHandler::new(policy, server_url, workloads),
        config.requeue_after(),
    ));

    let deployments: Api<Deployment> = Api::all(client.clone());
    let deploy_ctrl = Controller::new(
        deployments,
        WatcherConfig::default().timeout(config.watch_timeout_secs),
    )
    .shutdown_on_signal()
    .run(reconcile_deployment, error_policy, ctx.clone())
    .for_each(log_reconcile_result("AgentUpgradeDeployment"));

    let daemon_sets: Api<DaemonSet> = Api::all(client);
    let ds_ctrl = Controller::new(
        daemon_sets,
        WatcherConfig::default().timeout(config.watch_timeout_secs),
    )
    .shutdown_on_signal()
    .run(reconcile_daemon_set, error_policy, ctx)
    .for_each(log_reconcile_result("AgentUpgradeDaemonSet"));

    tracing::info!("- {} Deployment controller", AGENT_UPGRADE_CONTROLLER);
    tracing::info!("- {} DaemonSet controller", AGENT_UPGRADE_CONTROLLER);

    Ok(vec![Box::pin(deploy_ctrl), Box::pin(ds_ctrl)])
}

/// Build the ProjectRoleTemplateBinding ServiceAccount controller future
pub fn build_service_account_controllers(client: Client, config: &Config) -> Vec<ControllerFuture> {
    let bindings = Arc::new(KubeBindingClient::new(client.clone()));
    let ctx = Arc::new(Context::new(
        ServiceAccountBindingHandler::new(bindings),
        config.requeue_after(),
    ));

    let prtbs: Api<ProjectRoleTemplateBinding> = Api::all(client);
    let prtb_ctrl = Controller::new(
        prtbs,
        WatcherConfig::default().timeout(config.watch_timeout_secs),
    )
    .shutdown_on_signal()
    .run(reconcile_binding, error_policy, ctx)
    .for_each(log_reconcile_result("ProjectRoleTemplateBinding"));

    tracing::info!("- {} controller", PRTB_SERVICE_ACCOUNT_CONTROLLER);

    vec![Box::pin(prtb_ctrl)]
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
