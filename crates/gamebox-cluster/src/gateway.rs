//! The gateway seam between the orchestrator and the cluster control plane.

use async_trait::async_trait;

use crate::error::ClusterResult;
use crate::objects::{ClusterObject, ObjectKind};

/// Declarative create/delete of cluster objects.
///
/// Implementations must be safe to share across tasks; the orchestrator
/// holds one as `Arc<dyn ClusterGateway>`.
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    /// Create an object. Fails with `AlreadyExists` if an object of the
    /// same kind, namespace, and name is present.
    async fn create(&self, object: &ClusterObject) -> ClusterResult<()>;

    /// Delete an object. Succeeds if the object is already absent.
    async fn delete(&self, kind: ObjectKind, namespace: &str, name: &str) -> ClusterResult<()>;
}
