//! gamebox-cluster — the cluster gateway for Gamebox.
//!
//! Every allocation is backed by three remote objects that share one name:
//! a workload (Pod), a network endpoint (Service), and an ingress route.
//! This crate describes those objects and declares them against a cluster.
//!
//! # Architecture
//!
//! ```text
//! ClusterGateway (trait, object-safe)
//!   ├── KubeGateway      Kubernetes REST API over HTTP/1 (hyper)
//!   └── InMemoryGateway  process-local object map with fault injection
//! ```
//!
//! Gateways are declarative and non-transactional: each call either creates
//! or deletes exactly one object. Deleting an object that does not exist
//! succeeds. Callers own ordering and never get retries from this layer.

pub mod error;
pub mod gateway;
pub mod kube;
pub mod memory;
pub mod objects;

pub use error::{ClusterError, ClusterResult};
pub use gateway::ClusterGateway;
pub use kube::KubeGateway;
pub use memory::{InMemoryGateway, Operation};
pub use objects::*;
