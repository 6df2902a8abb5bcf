//! Orchestrator error types.

use thiserror::Error;

use gamebox_cluster::ClusterError;
use gamebox_state::{AllocationId, StateError};

use crate::orchestrator::Teardown;

/// Errors surfaced by allocation lifecycle operations.
///
/// `Cluster` and `State` together form the upstream-failure class: a remote
/// dependency failed and nothing was retried.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("already provisioned: {0}")]
    Conflict(String),

    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("record store error: {0}")]
    State(#[from] StateError),

    /// Cluster cleanup ran but the record could not be removed; the stale
    /// record needs manual reconciliation.
    #[error("allocation {allocation_id} torn down in cluster but record deletion failed: {source}")]
    PartialFailure {
        allocation_id: AllocationId,
        teardown: Teardown,
        source: StateError,
    },
}

impl OrchestratorError {
    /// Whether a remote dependency failed.
    pub fn is_upstream(&self) -> bool {
        matches!(self, OrchestratorError::Cluster(_) | OrchestratorError::State(_))
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
