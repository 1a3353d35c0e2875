//! ProjectRoleTemplateBinding ServiceAccount controller
//!
//! Stamps `management.cattle.io/serviceAccount` with the binding's
//! ServiceAccount subject so the permissions defined in the binding reach
//! the right ServiceAccount. The annotation is written once; its presence
//! marks the binding as processed.

use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{Api, PostParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, info, instrument};

#[cfg(test)]
use mockall::automock;

use super::{object_key, Context};
use crate::crd::ProjectRoleTemplateBinding;
use crate::Error;

/// Handler name of the binding controller
pub const PRTB_SERVICE_ACCOUNT_CONTROLLER: &str = "prtb-service-account-controller";

/// Trait abstracting binding writes
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BindingClient: Send + Sync {
    /// Replace a binding, returning the object as stored by the API server
    async fn update(
        &self,
        binding: &ProjectRoleTemplateBinding,
    ) -> Result<ProjectRoleTemplateBinding, Error>;
}

/// Real Kubernetes client implementation
pub struct KubeBindingClient {
    client: Client,
}

impl KubeBindingClient {
    /// Create a new KubeBindingClient wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BindingClient for KubeBindingClient {
    async fn update(
        &self,
        binding: &ProjectRoleTemplateBinding,
    ) -> Result<ProjectRoleTemplateBinding, Error> {
        let name = binding
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::validation("ProjectRoleTemplateBinding has no name"))?;
        let namespace = binding
            .metadata
            .namespace
            .as_deref()
            .ok_or_else(|| Error::validation("ProjectRoleTemplateBinding has no namespace"))?;

        let api: Api<ProjectRoleTemplateBinding> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.replace(name, &PostParams::default(), binding).await?)
    }
}

/// Annotates bindings with their ServiceAccount subject
pub struct ServiceAccountBindingHandler {
    bindings: Arc<dyn BindingClient>,
}

impl ServiceAccountBindingHandler {
    /// Create a handler writing through `bindings`
    pub fn new(bindings: Arc<dyn BindingClient>) -> Self {
        Self { bindings }
    }

    /// Sync one binding event.
    ///
    /// Tombstones, bindings without a ServiceAccount subject and bindings
    /// already carrying the annotation come back unchanged without any API
    /// call. Otherwise an annotated copy is submitted and the stored object is
    /// returned; the input is never mutated.
    pub async fn sync(
        &self,
        key: &str,
        binding: Option<&ProjectRoleTemplateBinding>,
    ) -> Result<Option<ProjectRoleTemplateBinding>, Error> {
        let Some(binding) = binding else {
            return Ok(None);
        };

        let Some(service_account) = binding.service_account_subject() else {
            return Ok(Some(binding.clone()));
        };

        if binding.service_account_annotation().is_some() {
            debug!(key, "binding already annotated");
            return Ok(Some(binding.clone()));
        }

        let copied = binding.with_service_account_annotation(service_account);
        let updated = self.bindings.update(&copied).await?;
        info!(key, service_account, "annotated binding with its ServiceAccount");
        Ok(Some(updated))
    }
}

/// Reconcile a ProjectRoleTemplateBinding through the ServiceAccount handler
#[instrument(skip(binding, ctx), fields(binding = %binding.name_any()))]
pub async fn reconcile_binding(
    binding: Arc<ProjectRoleTemplateBinding>,
    ctx: Arc<Context<ServiceAccountBindingHandler>>,
) -> Result<Action, Error> {
    let key = object_key(&binding.metadata);
    ctx.handler.sync(&key, Some(binding.as_ref())).await?;
    Ok(Action::await_change())
}
