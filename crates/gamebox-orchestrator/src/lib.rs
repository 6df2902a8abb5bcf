//! gamebox-orchestrator — allocation lifecycle for Gamebox.
//!
//! The [`Orchestrator`] turns create/get/delete requests for an
//! (account, template) pair into cluster gateway calls and record store
//! writes. The [`Reclaimer`] periodically tears down expired allocations
//! through the same teardown path.
//!
//! # Ordering
//!
//! Create declares workload, service, then ingress, and records the
//! allocation only after all three succeed. Teardown runs in reverse and
//! removes the record last. Neither direction rolls back; partially
//! declared objects are left for an operator.

pub mod error;
pub mod hydrate;
pub mod orchestrator;
pub mod plan;
pub mod reclaimer;

pub use error::{OrchestratorError, OrchestratorResult};
pub use hydrate::{AllocationView, Hydrator, hydrate};
pub use orchestrator::{Orchestrator, Stores, Teardown};
pub use reclaimer::{ReclaimReport, Reclaimer};
