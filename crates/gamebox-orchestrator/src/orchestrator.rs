//! Allocation lifecycle: create, get, delete.
//!
//! The orchestrator holds no in-memory state of its own. The record store
//! is authoritative for admission; the cluster gateway is driven step by
//! step and never rolled back on failure.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use gamebox_cluster::{ClusterError, ClusterGateway, ObjectKind};
use gamebox_core::epoch_secs;
use gamebox_state::*;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::plan::{TEARDOWN_ORDER, address, object_name, provision_plan};

/// The repositories the orchestrator reads and writes.
#[derive(Clone)]
pub struct Stores {
    pub accounts: Arc<dyn AccountRepository>,
    pub templates: Arc<dyn TemplateRepository>,
    pub allocations: Arc<dyn AllocationRepository>,
}

impl Stores {
    /// Serve all three repositories from one store.
    pub fn from_state(store: StateStore) -> Self {
        let store = Arc::new(store);
        Self {
            accounts: store.clone(),
            templates: store.clone(),
            allocations: store,
        }
    }
}

/// Outcome of tearing down one allocation.
///
/// Cluster deletions are best-effort: failures are collected here rather
/// than aborting the teardown.
#[derive(Debug, Default)]
pub struct Teardown {
    pub allocation_id: AllocationId,
    pub cluster_failures: Vec<(ObjectKind, ClusterError)>,
}

impl Teardown {
    /// Whether every cluster deletion succeeded.
    pub fn is_clean(&self) -> bool {
        self.cluster_failures.is_empty()
    }
}

pub struct Orchestrator {
    stores: Stores,
    gateway: Arc<dyn ClusterGateway>,
    ttl: Duration,
}

impl Orchestrator {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

    pub fn new(stores: Stores, gateway: Arc<dyn ClusterGateway>) -> Self {
        Self {
            stores,
            gateway,
            ttl: Self::DEFAULT_TTL,
        }
    }

    /// Lifetime given to new allocations.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// The live allocation for `account` on `template`.
    pub fn get(&self, account: &Account, template: &Template) -> OrchestratorResult<Allocation> {
        self.stores
            .allocations
            .get_allocation(account.id, template.id)?
            .ok_or_else(|| not_provisioned(account, template))
    }

    /// Provision a new allocation for `account` on `template`.
    ///
    /// Declares the workload, service, and ingress in that order, then
    /// records the allocation. If any cluster step fails, objects declared
    /// by earlier steps are left in place and no record is written.
    pub async fn create(
        &self,
        account: &Account,
        template: &Template,
    ) -> OrchestratorResult<Allocation> {
        // Fast path only; the record insert below is the authoritative check.
        if let Some(existing) = self
            .stores
            .allocations
            .slot_occupant(account.id, template.id)?
        {
            return Err(OrchestratorError::Conflict(format!(
                "account {} already holds allocation {}",
                account.id, existing.id
            )));
        }

        let name = object_name(&template.namespace, &account.domain);
        let mut declared = Vec::with_capacity(3);
        for object in provision_plan(account, template) {
            if let Err(e) = self.gateway.create(&object).await {
                error!(
                    account_id = account.id,
                    template_id = template.id,
                    %name,
                    kind = %object.kind(),
                    left_behind = ?declared,
                    error = %e,
                    "cluster create failed, aborting allocation"
                );
                return Err(e.into());
            }
            debug!(%name, kind = %object.kind(), "cluster object declared");
            declared.push(object.kind());
        }

        let now = epoch_secs();
        let record = NewAllocation {
            account_id: account.id,
            template_id: template.id,
            namespace: template.namespace.clone(),
            name: name.clone(),
            address: address(&account.domain, &template.domain),
            created_at: now,
            expires_at: now + self.ttl.as_secs(),
        };

        match self.stores.allocations.create_allocation(&record) {
            Ok(allocation) => {
                info!(
                    allocation_id = allocation.id,
                    account_id = account.id,
                    template_id = template.id,
                    address = %allocation.address,
                    expires_at = allocation.expires_at,
                    "allocation created"
                );
                Ok(allocation)
            }
            Err(e) if e.is_duplicate() => {
                warn!(
                    account_id = account.id,
                    template_id = template.id,
                    %name,
                    "lost admission race after declaring cluster objects; objects orphaned"
                );
                Err(OrchestratorError::Conflict(format!(
                    "account {} already holds an allocation",
                    account.id
                )))
            }
            Err(e) => {
                error!(
                    account_id = account.id,
                    template_id = template.id,
                    %name,
                    error = %e,
                    "failed to record allocation; cluster objects orphaned"
                );
                Err(e.into())
            }
        }
    }

    /// Tear down the live allocation for `account` on `template`.
    pub async fn delete(
        &self,
        account: &Account,
        template: &Template,
    ) -> OrchestratorResult<Teardown> {
        let allocation = self.get(account, template)?;
        self.teardown(&allocation).await
    }

    /// Tear down a live allocation by id.
    pub async fn delete_by_id(&self, id: AllocationId) -> OrchestratorResult<Teardown> {
        let allocation = self
            .stores
            .allocations
            .get_allocation_by_id(id)?
            .filter(Allocation::is_live)
            .ok_or_else(|| OrchestratorError::NotFound(format!("allocation {id}")))?;
        self.teardown(&allocation).await
    }

    /// Delete the allocation's cluster objects in reverse creation order,
    /// then remove its record. Objects are addressed by the namespace and
    /// name recorded at creation.
    ///
    /// Cluster failures are logged and reported but never stop the
    /// remaining steps. A failed record removal is a `PartialFailure`.
    pub async fn teardown(&self, allocation: &Allocation) -> OrchestratorResult<Teardown> {
        let mut report = Teardown {
            allocation_id: allocation.id,
            cluster_failures: Vec::new(),
        };

        for kind in TEARDOWN_ORDER {
            if let Err(e) = self
                .gateway
                .delete(kind, &allocation.namespace, &allocation.name)
                .await
            {
                warn!(
                    allocation_id = allocation.id,
                    namespace = %allocation.namespace,
                    name = %allocation.name,
                    %kind,
                    error = %e,
                    "cluster delete failed, continuing teardown"
                );
                report.cluster_failures.push((kind, e));
            }
        }

        match self.stores.allocations.delete_allocation(allocation.id) {
            Ok(removed) => {
                if !removed {
                    debug!(allocation_id = allocation.id, "record already removed");
                }
                info!(
                    allocation_id = allocation.id,
                    name = %allocation.name,
                    cluster_failures = report.cluster_failures.len(),
                    "allocation torn down"
                );
                Ok(report)
            }
            Err(e) => {
                error!(
                    allocation_id = allocation.id,
                    error = %e,
                    "cluster teardown done but record deletion failed"
                );
                Err(OrchestratorError::PartialFailure {
                    allocation_id: allocation.id,
                    teardown: report,
                    source: e,
                })
            }
        }
    }
}

fn not_provisioned(account: &Account, template: &Template) -> OrchestratorError {
    OrchestratorError::NotFound(format!(
        "allocation for account {} on template {}",
        account.id, template.uid
    ))
}
