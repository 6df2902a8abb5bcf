//! Cluster gateway error types.

use thiserror::Error;

use crate::objects::ObjectKind;

/// Errors that can occur while talking to the cluster control plane.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("invalid api url: {0}")]
    InvalidUrl(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        kind: ObjectKind,
        namespace: String,
        name: String,
    },

    #[error("api server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("serialization error: {0}")]
    Serialize(String),

    /// Fault injected by a test gateway.
    #[error("injected failure: {0}")]
    Injected(String),
}

pub type ClusterResult<T> = Result<T, ClusterError>;
