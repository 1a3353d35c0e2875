//! Integration tests for the agent-upgrade controller
//!
//! These tests tell the story of a cluster imported into Rancher before v2.5:
//! its agents still run a legacy image and must be removed so they can be
//! recreated, while anything else in the cluster is left alone.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec, Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, EnvVar, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;

use cattle_controllers::controller::agent_upgrade::{
    AGENT_NAMESPACE, CLUSTER_AGENT_NAME, NODE_AGENT_NAME, SERVER_URL_ENV,
};
use cattle_controllers::controller::{
    AgentUpgradeHandler, AgentUpgradePolicy, KubeWorkloadClient,
};
use cattle_controllers::settings::StaticServerUrl;

use super::helpers::{ensure_namespace, ensure_test_cluster};

const SERVER_URL: &str = "https://rancher.kind.local";

// =============================================================================
// Test Fixtures
// =============================================================================

fn pod_template(app: &str, image: &str, server_url: &str) -> PodTemplateSpec {
    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(BTreeMap::from([("app".to_string(), app.to_string())])),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers: vec![Container {
                name: app.to_string(),
                image: Some(image.to_string()),
                env: Some(vec![EnvVar {
                    name: SERVER_URL_ENV.to_string(),
                    value: Some(server_url.to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }],
            ..Default::default()
        }),
    }
}

fn selector(app: &str) -> LabelSelector {
    LabelSelector {
        match_labels: Some(BTreeMap::from([("app".to_string(), app.to_string())])),
        ..Default::default()
    }
}

fn node_agent(image: &str) -> DaemonSet {
    DaemonSet {
        metadata: ObjectMeta {
            name: Some(NODE_AGENT_NAME.to_string()),
            namespace: Some(AGENT_NAMESPACE.to_string()),
            ..Default::default()
        },
        spec: Some(DaemonSetSpec {
            selector: selector(NODE_AGENT_NAME),
            template: pod_template(NODE_AGENT_NAME, image, SERVER_URL),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn cluster_agent(image: &str) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(CLUSTER_AGENT_NAME.to_string()),
            namespace: Some(AGENT_NAMESPACE.to_string()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(0),
            selector: selector(CLUSTER_AGENT_NAME),
            template: pod_template(CLUSTER_AGENT_NAME, image, SERVER_URL),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn handler(client: &Client) -> AgentUpgradeHandler {
    AgentUpgradeHandler::new(
        Arc::new(AgentUpgradePolicy::legacy_agents().expect("built-in policy")),
        Arc::new(StaticServerUrl::new(SERVER_URL)),
        Arc::new(KubeWorkloadClient::new(client.clone())),
    )
}

/// Whether the object is gone or on its way out
fn is_deleted(meta: Option<&ObjectMeta>) -> bool {
    meta.is_none_or(|m| m.deletion_timestamp.is_some())
}

// =============================================================================
// Stories
// =============================================================================

/// Story: A node agent from Rancher v2.3 is removed so it can be recreated
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_legacy_node_agent_is_deleted() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    ensure_namespace(&client, AGENT_NAMESPACE)
        .await
        .expect("failed to create namespace");

    let api: Api<DaemonSet> = Api::namespaced(client.clone(), AGENT_NAMESPACE);
    let _ = api.delete(NODE_AGENT_NAME, &DeleteParams::default()).await;

    let created = api
        .create(&PostParams::default(), &node_agent("rancher/rancher-agent:v2.3.9"))
        .await
        .expect("failed to create node agent");

    handler(&client)
        .on_daemon_set_change("cattle-system/cattle-node-agent", Some(&created))
        .await
        .expect("delete should succeed");

    let after = api
        .get_opt(NODE_AGENT_NAME)
        .await
        .expect("failed to read node agent");
    assert!(is_deleted(after.as_ref().map(|ds| &ds.metadata)));
}

/// Story: A cluster agent already on v2.5 keeps running
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_current_cluster_agent_is_kept() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    ensure_namespace(&client, AGENT_NAMESPACE)
        .await
        .expect("failed to create namespace");

    let api: Api<Deployment> = Api::namespaced(client.clone(), AGENT_NAMESPACE);
    let _ = api.delete(CLUSTER_AGENT_NAME, &DeleteParams::default()).await;

    let created = api
        .create(&PostParams::default(), &cluster_agent("rancher/rancher-agent:v2.5.0"))
        .await
        .expect("failed to create cluster agent");

    handler(&client)
        .on_deployment_change("cattle-system/cattle-cluster-agent", Some(&created))
        .await
        .expect("no-op should succeed");

    let after = api
        .get_opt(CLUSTER_AGENT_NAME)
        .await
        .expect("failed to read cluster agent");
    assert!(!is_deleted(after.as_ref().map(|d| &d.metadata)));

    api.delete(CLUSTER_AGENT_NAME, &DeleteParams::default())
        .await
        .expect("cleanup");
}

/// Story: Deleting an agent that vanished in the meantime reports not-found
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_vanished_agent_surfaces_not_found() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    ensure_namespace(&client, AGENT_NAMESPACE)
        .await
        .expect("failed to create namespace");

    let api: Api<Deployment> = Api::namespaced(client.clone(), AGENT_NAMESPACE);
    let _ = api.delete(CLUSTER_AGENT_NAME, &DeleteParams::default()).await;

    // The event still carries the last observed object
    let stale = cluster_agent("rancher/rancher-agent:v2.4.3");
    let err = handler(&client)
        .on_deployment_change("cattle-system/cattle-cluster-agent", Some(&stale))
        .await
        .expect_err("object is already gone");
    assert!(err.is_not_found());
}
