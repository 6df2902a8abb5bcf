//! gamebox-state — durable record store for Gamebox.
//!
//! Backed by [redb](https://docs.rs/redb), stores accounts, environment
//! templates, and allocations.
//!
//! # Architecture
//!
//! Rows are JSON-serialized into `u64 -> &[u8]` tables keyed by surrogate id.
//! Every uniqueness constraint is a separate `&str -> u64` index table that
//! only holds live rows: soft-deleting a row removes its index entries, so a
//! new row may take the same token, name, or allocation slot afterwards.
//!
//! Each mutating call runs in one redb write transaction. redb serializes
//! writers, so the index check and the insert cannot interleave with another
//! writer.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and implements the three narrow repository traits in [`repository`].

pub mod error;
pub mod repository;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use repository::{AccountRepository, AllocationRepository, TemplateRepository};
pub use store::StateStore;
pub use types::*;
