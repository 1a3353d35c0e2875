//! Error types for the cattle controllers

use thiserror::Error;

/// Main error type for controller operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error (delete/update rejected, network failure, conflict)
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Invalid controller configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Object cannot be submitted to the API server as-is
    #[error("validation error: {0}")]
    Validation(String),
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True when the API server answered 404 for the targeted object
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Kube(kube::Error::Api(ae)) if ae.code == 404)
    }

    /// True when the API server rejected a write because of a stale resourceVersion
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Kube(kube::Error::Api(ae)) if ae.code == 409)
    }
}
