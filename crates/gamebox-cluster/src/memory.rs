//! In-memory cluster gateway.
//!
//! Keeps declared objects in a process-local map. Used by the daemon's
//! `memory` cluster mode and by tests, which can inject failures per
//! operation and object kind and inspect the call log.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{ClusterError, ClusterResult};
use crate::gateway::ClusterGateway;
use crate::objects::{ClusterObject, ObjectKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Delete,
}

type ObjectKey = (ObjectKind, String, String);

#[derive(Default)]
struct Inner {
    objects: BTreeMap<ObjectKey, ClusterObject>,
    faults: HashSet<(Operation, ObjectKind)>,
    calls: Vec<(Operation, ObjectKind, String)>,
}

/// Cluster gateway that stores objects in memory.
#[derive(Default)]
pub struct InMemoryGateway {
    inner: Mutex<Inner>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future `op` on `kind` fail until cleared.
    pub async fn fail_on(&self, op: Operation, kind: ObjectKind) {
        self.inner.lock().await.faults.insert((op, kind));
    }

    pub async fn clear_faults(&self) {
        self.inner.lock().await.faults.clear();
    }

    pub async fn get(&self, kind: ObjectKind, namespace: &str, name: &str) -> Option<ClusterObject> {
        let key = (kind, namespace.to_string(), name.to_string());
        self.inner.lock().await.objects.get(&key).cloned()
    }

    /// All declared objects, ordered by kind, namespace, name.
    pub async fn objects(&self) -> Vec<ClusterObject> {
        self.inner.lock().await.objects.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.objects.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Every call received so far, including failed ones, in arrival order.
    pub async fn calls(&self) -> Vec<(Operation, ObjectKind, String)> {
        self.inner.lock().await.calls.clone()
    }
}

#[async_trait]
impl ClusterGateway for InMemoryGateway {
    async fn create(&self, object: &ClusterObject) -> ClusterResult<()> {
        let kind = object.kind();
        let mut inner = self.inner.lock().await;
        inner
            .calls
            .push((Operation::Create, kind, object.name().to_string()));

        if inner.faults.contains(&(Operation::Create, kind)) {
            return Err(ClusterError::Injected(format!("create {kind} {}", object.name())));
        }

        let key = (kind, object.namespace().to_string(), object.name().to_string());
        if inner.objects.contains_key(&key) {
            return Err(ClusterError::AlreadyExists {
                kind,
                namespace: key.1,
                name: key.2,
            });
        }
        inner.objects.insert(key, object.clone());
        debug!(%kind, name = object.name(), "object created in memory");
        Ok(())
    }

    async fn delete(&self, kind: ObjectKind, namespace: &str, name: &str) -> ClusterResult<()> {
        let mut inner = self.inner.lock().await;
        inner.calls.push((Operation::Delete, kind, name.to_string()));

        if inner.faults.contains(&(Operation::Delete, kind)) {
            return Err(ClusterError::Injected(format!("delete {kind} {name}")));
        }

        let key = (kind, namespace.to_string(), name.to_string());
        let existed = inner.objects.remove(&key).is_some();
        debug!(%kind, %name, existed, "object deleted from memory");
        Ok(())
    }
}
