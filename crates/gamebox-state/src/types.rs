//! Domain types for the Gamebox record store.
//!
//! All types are serializable to/from JSON for storage in redb tables.
//! Rows are never physically removed; `deleted_at` marks a soft delete.

use gamebox_core::Timestamp;
use serde::{Deserialize, Serialize};

pub type AccountId = u64;
pub type TemplateId = u64;
pub type AllocationId = u64;

// ── Account ───────────────────────────────────────────────────────

/// A tenant identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: AccountId,
    /// Opaque bearer token, unique among live accounts.
    pub token: String,
    /// Generated DNS label, unique among live accounts.
    pub domain: String,
    pub created_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub deleted_at: Option<Timestamp>,
}

impl Account {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

// ── Template ──────────────────────────────────────────────────────

/// Container resource limits and requests, in Kubernetes quantity syntax.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceProfile {
    pub limits_cpu: Option<String>,
    pub limits_memory: Option<String>,
    pub requests_cpu: Option<String>,
    pub requests_memory: Option<String>,
}

/// A provisionable workload definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Template {
    pub id: TemplateId,
    /// Public identifier used in client-facing URLs.
    pub uid: String,
    /// Display name; also the container image reference.
    pub name: String,
    /// Cluster namespace the workload is created in.
    pub namespace: String,
    /// Base routing domain; allocations are served at `{account}.{domain}`.
    pub domain: String,
    pub port: u16,
    pub resources: Option<ResourceProfile>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub deleted_at: Option<Timestamp>,
}

impl Template {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Input for creating or replacing a template definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateDraft {
    pub name: String,
    pub namespace: String,
    pub domain: String,
    pub port: u16,
    #[serde(default)]
    pub resources: Option<ResourceProfile>,
}

// ── Allocation ────────────────────────────────────────────────────

/// One live provisioned environment.
///
/// References its account and template by id only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Allocation {
    pub id: AllocationId,
    pub account_id: AccountId,
    pub template_id: TemplateId,
    /// Namespace the objects were created in. Later template edits do not
    /// move them.
    pub namespace: String,
    /// Name shared by the workload, service, and ingress objects.
    pub name: String,
    /// Externally reachable host.
    pub address: String,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub deleted_at: Option<Timestamp>,
}

impl Allocation {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Whether the allocation is past its expiry as of `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at < now
    }
}

/// Input for recording a freshly provisioned allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAllocation {
    pub account_id: AccountId,
    pub template_id: TemplateId,
    pub namespace: String,
    pub name: String,
    pub address: String,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}
