//! Setting resource (`management.cattle.io/v3`)

use std::borrow::Cow;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ClusterResourceScope;
use kube::core::TypeMeta;
use kube::Resource;
use serde::{Deserialize, Serialize};

use super::{MANAGEMENT_GROUP, MANAGEMENT_VERSION};

/// Name of the Setting holding the externally reachable Rancher URL
pub const SERVER_URL_SETTING: &str = "server-url";

/// Cluster-scoped key/value setting
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    /// apiVersion and kind, as sent by the API server
    #[serde(flatten, default)]
    pub types: Option<TypeMeta>,

    /// Standard object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// Explicitly configured value
    #[serde(default)]
    pub value: String,

    /// Built-in default used while `value` is empty
    #[serde(default)]
    pub default: String,

    /// Whether an administrator changed the value
    #[serde(default)]
    pub customized: bool,

    /// Where the value came from (`env`, `db`, ...)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
}

impl Setting {
    /// Create a setting with the given value
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            types: Some(TypeMeta {
                api_version: Self::api_version(&()).into_owned(),
                kind: Self::kind(&()).into_owned(),
            }),
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            value: value.to_string(),
            ..Default::default()
        }
    }

    /// The configured value, falling back to the default when unset
    pub fn effective_value(&self) -> &str {
        if self.value.is_empty() {
            &self.default
        } else {
            &self.value
        }
    }
}

impl Resource for Setting {
    type DynamicType = ();
    type Scope = ClusterResourceScope;

    fn kind(_: &()) -> Cow<'_, str> {
        Cow::Borrowed("Setting")
    }

    fn group(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(MANAGEMENT_GROUP)
    }

    fn version(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(MANAGEMENT_VERSION)
    }

    fn plural(_: &()) -> Cow<'_, str> {
        Cow::Borrowed("settings")
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
