//! Rancher management resources watched by the controllers
//!
//! Rancher owns these CRDs; [`binding_crd`] and [`setting_crd`] exist so a
//! bare cluster (kind, local development) can be prepared to serve them.

mod binding;
mod setting;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;

use crate::Error;

pub use binding::{ProjectRoleTemplateBinding, SERVICE_ACCOUNT_ANNOTATION};
pub use setting::{Setting, SERVER_URL_SETTING};

/// API group of Rancher management resources
pub const MANAGEMENT_GROUP: &str = "management.cattle.io";

/// API version of Rancher management resources
pub const MANAGEMENT_VERSION: &str = "v3";

/// CRD serving ProjectRoleTemplateBindings
pub fn binding_crd() -> Result<CustomResourceDefinition, Error> {
    schemaless_crd(
        "ProjectRoleTemplateBinding",
        "projectroletemplatebindings",
        "Namespaced",
    )
}

/// CRD serving Settings
pub fn setting_crd() -> Result<CustomResourceDefinition, Error> {
    schemaless_crd("Setting", "settings", "Cluster")
}

/// Rancher registers these types without a structural schema, so the CRD
/// preserves unknown fields at the root.
fn schemaless_crd(
    kind: &str,
    plural: &str,
    scope: &str,
) -> Result<CustomResourceDefinition, Error> {
    let crd = serde_json::json!({
        "apiVersion": "apiextensions.k8s.io/v1",
        "kind": "CustomResourceDefinition",
        "metadata": { "name": format!("{plural}.{MANAGEMENT_GROUP}") },
        "spec": {
            "group": MANAGEMENT_GROUP,
            "scope": scope,
            "names": {
                "kind": kind,
                "plural": plural,
                "singular": kind.to_lowercase(),
            },
            "versions": [{
                "name": MANAGEMENT_VERSION,
                "served": true,
                "storage": true,
                "schema": {
                    "openAPIV3Schema": {
                        "type": "object",
                        "x-kubernetes-preserve-unknown-fields": true,
                    }
                },
            }],
        }
    });

    serde_json::from_value(crd)
        .map_err(|e| Error::validation(format!("invalid {kind} CRD manifest: {e}")))
}
