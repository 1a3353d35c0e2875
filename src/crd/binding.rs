//! ProjectRoleTemplateBinding resource (`management.cattle.io/v3`)
//!
//! Rancher stores the binding subject as top-level fields next to `metadata`
//! instead of under a `spec`, so the type implements [`Resource`] by hand
//! rather than through the `CustomResource` derive.

use std::borrow::Cow;
use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::NamespaceResourceScope;
use kube::core::TypeMeta;
use kube::Resource;
use serde::{Deserialize, Serialize};

use super::{MANAGEMENT_GROUP, MANAGEMENT_VERSION};

/// Annotation recording which ServiceAccount a binding grants permissions to
pub const SERVICE_ACCOUNT_ANNOTATION: &str = "management.cattle.io/serviceAccount";

/// Binds a role template to a subject within a Rancher project
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRoleTemplateBinding {
    /// apiVersion and kind, as sent by the API server
    #[serde(flatten, default)]
    pub types: Option<TypeMeta>,

    /// Standard object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// Project the binding applies to (`<cluster>:<project>`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,

    /// Role template granted by the binding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_template_name: Option<String>,

    /// User subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,

    /// User principal subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_principal_name: Option<String>,

    /// Group subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,

    /// Group principal subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_principal_name: Option<String>,

    /// ServiceAccount subject (`<namespace>:<name>`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
}

impl ProjectRoleTemplateBinding {
    /// Create an empty binding with type information populated
    pub fn new(name: &str, namespace: &str) -> Self {
        Self {
            types: Some(TypeMeta {
                api_version: Self::api_version(&()).into_owned(),
                kind: Self::kind(&()).into_owned(),
            }),
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// ServiceAccount subject, treating an empty string as unset
    pub fn service_account_subject(&self) -> Option<&str> {
        self.service_account.as_deref().filter(|sa| !sa.is_empty())
    }

    /// Value of the ServiceAccount annotation, if already stamped
    pub fn service_account_annotation(&self) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(SERVICE_ACCOUNT_ANNOTATION))
            .map(String::as_str)
    }

    /// Returns a copy with the ServiceAccount annotation set to `value`.
    ///
    /// The annotation map is created if the object had none. `self` is left
    /// untouched.
    pub fn with_service_account_annotation(&self, value: &str) -> Self {
        let mut copied = self.clone();
        copied
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(SERVICE_ACCOUNT_ANNOTATION.to_string(), value.to_string());
        copied
    }
}

impl Resource for ProjectRoleTemplateBinding {
    type DynamicType = ();
    type Scope = NamespaceResourceScope;

    fn kind(_: &()) -> Cow<'_, str> {
        Cow::Borrowed("ProjectRoleTemplateBinding")
    }

    fn group(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(MANAGEMENT_GROUP)
    }

    fn version(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(MANAGEMENT_VERSION)
    }

    fn plural(_: &()) -> Cow<'_, str> {
        Cow::Borrowed("projectroletemplatebindings")
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
