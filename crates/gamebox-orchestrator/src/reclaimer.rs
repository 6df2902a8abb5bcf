//! Reclaimer: tears down allocations past their expiry.
//!
//! Each cycle lists expired live allocations and runs the same teardown
//! path as an explicit delete on every one of them. Teardown needs only the
//! allocation record, so allocations whose account or template is gone are
//! reclaimed too. A failure on one allocation is logged and recorded without
//! stopping the rest; anything whose record survives is picked up again next
//! cycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use gamebox_core::{Timestamp, epoch_secs};
use gamebox_state::AllocationId;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::orchestrator::{Orchestrator, Teardown};

/// Outcome of one reclamation cycle.
#[derive(Debug, Default)]
pub struct ReclaimReport {
    /// Allocations whose records were removed.
    pub reclaimed: Vec<Teardown>,
    /// Allocations that could not be reclaimed this cycle.
    pub failed: Vec<(AllocationId, OrchestratorError)>,
}

impl ReclaimReport {
    pub fn reclaimed_ids(&self) -> Vec<AllocationId> {
        self.reclaimed.iter().map(|t| t.allocation_id).collect()
    }

    /// Cluster deletions that failed across all reclaimed allocations.
    pub fn cluster_failures(&self) -> usize {
        self.reclaimed.iter().map(|t| t.cluster_failures.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.reclaimed.is_empty() && self.failed.is_empty()
    }
}

pub struct Reclaimer {
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
}

impl Reclaimer {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

    pub fn new(orchestrator: Arc<Orchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
        }
    }

    /// Reclaim every live allocation with `expires_at < now`.
    ///
    /// Only a failure to list expired allocations aborts the cycle.
    pub async fn run_cycle(&self, now: Timestamp) -> OrchestratorResult<ReclaimReport> {
        let stores = self.orchestrator.stores();
        let expired = stores.allocations.list_expired_allocations(now)?;
        let mut report = ReclaimReport::default();
        if expired.is_empty() {
            return Ok(report);
        }
        debug!(count = expired.len(), now, "reclaiming expired allocations");

        for allocation in expired {
            let id = allocation.id;
            match self.orchestrator.teardown(&allocation).await {
                Ok(teardown) => {
                    if !teardown.is_clean() {
                        warn!(
                            allocation_id = id,
                            failures = teardown.cluster_failures.len(),
                            "expired allocation reclaimed with cluster errors"
                        );
                    }
                    report.reclaimed.push(teardown);
                }
                Err(e) => {
                    error!(
                        allocation_id = id,
                        account_id = allocation.account_id,
                        template_id = allocation.template_id,
                        error = %e,
                        "failed to reclaim expired allocation"
                    );
                    report.failed.push((id, e));
                }
            }
        }

        info!(
            reclaimed = report.reclaimed.len(),
            failed = report.failed.len(),
            cluster_failures = report.cluster_failures(),
            "reclamation cycle complete"
        );
        Ok(report)
    }

    /// Run cycles until `shutdown` fires, sleeping `interval` between the end
    /// of one cycle and the start of the next.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.interval.as_millis() as u64, "reclaimer started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Err(e) = self.run_cycle(epoch_secs()).await {
                error!(error = %e, "reclamation cycle failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => {
                    break;
                }
            }
        }
        info!("reclaimer shutting down");
    }
}
