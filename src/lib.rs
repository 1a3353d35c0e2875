//! cattle-controllers - reconcilers for Rancher management clusters
//!
//! Two independent controllers share one pattern, watch → predicate → action:
//!
//! - **agent-upgrade** deletes `cattle-cluster-agent` Deployments and
//!   `cattle-node-agent` DaemonSets from Rancher v2.0-v2.4 that still point at
//!   this server, so they are recreated with a current image.
//! - **prtb-service-account** annotates each ProjectRoleTemplateBinding with
//!   its ServiceAccount subject the first time the subject is set.
//!
//! # Modules
//!
//! - [`controller`] - Predicates, handlers and reconcile entry points
//! - [`controller_runner`] - Registration of handlers with kube watches
//! - [`crd`] - Rancher management resources (ProjectRoleTemplateBinding, Setting)
//! - [`settings`] - Server URL lookup
//! - [`config`] - Command-line / environment configuration
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod controller_runner;
pub mod crd;
pub mod error;
pub mod settings;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
