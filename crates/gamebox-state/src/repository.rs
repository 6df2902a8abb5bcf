//! Narrow capability traits over the record store.
//!
//! Consumers depend on the trait they need rather than on `StateStore`, so
//! tests can substitute a single repository (e.g. one whose deletes fail)
//! without reimplementing the others.
//!
//! Lookups by surrogate id return soft-deleted rows too: allocations keep
//! weak references to their account and template, and those must stay
//! resolvable for teardown. Lookups by any unique key only see live rows.

use gamebox_core::Timestamp;

use crate::error::StateResult;
use crate::types::*;

pub trait AccountRepository: Send + Sync {
    /// Register an account with a freshly generated domain label.
    ///
    /// Fails with `Duplicate` if a live account already holds `token`.
    fn create_account(&self, token: &str) -> StateResult<Account>;

    /// Register several accounts atomically: either all are created or none.
    fn batch_create_accounts(&self, tokens: &[String]) -> StateResult<Vec<Account>>;

    fn get_account(&self, id: AccountId) -> StateResult<Option<Account>>;

    fn get_account_by_token(&self, token: &str) -> StateResult<Option<Account>>;

    fn get_account_by_domain(&self, domain: &str) -> StateResult<Option<Account>>;

    /// List live accounts.
    fn list_accounts(&self) -> StateResult<Vec<Account>>;

    /// Soft-delete an account. Returns true if a live row was deleted.
    fn delete_account(&self, id: AccountId) -> StateResult<bool>;
}

pub trait TemplateRepository: Send + Sync {
    /// Create a template with a generated public uid.
    ///
    /// Fails with `Duplicate` if a live template already uses `draft.name`.
    fn create_template(&self, draft: &TemplateDraft) -> StateResult<Template>;

    fn get_template(&self, id: TemplateId) -> StateResult<Option<Template>>;

    fn get_template_by_uid(&self, uid: &str) -> StateResult<Option<Template>>;

    /// List live templates.
    fn list_templates(&self) -> StateResult<Vec<Template>>;

    /// Replace a live template's definition, keeping its id and uid.
    fn update_template(&self, id: TemplateId, draft: &TemplateDraft) -> StateResult<Template>;

    /// Soft-delete a template. Returns true if a live row was deleted.
    fn delete_template(&self, id: TemplateId) -> StateResult<bool>;
}

pub trait AllocationRepository: Send + Sync {
    /// Record an allocation.
    ///
    /// Fails with `Duplicate` if a live allocation already occupies the
    /// admission slot for `(account_id, template_id)`. This is the
    /// authoritative admission check.
    fn create_allocation(&self, new: &NewAllocation) -> StateResult<Allocation>;

    /// The live allocation for exactly this (account, template) pair.
    fn get_allocation(
        &self,
        account_id: AccountId,
        template_id: TemplateId,
    ) -> StateResult<Option<Allocation>>;

    fn get_allocation_by_id(&self, id: AllocationId) -> StateResult<Option<Allocation>>;

    /// The live allocation occupying the admission slot that an allocation
    /// for `(account_id, template_id)` would take. Under a per-account scope
    /// this may belong to a different template.
    fn slot_occupant(
        &self,
        account_id: AccountId,
        template_id: TemplateId,
    ) -> StateResult<Option<Allocation>>;

    /// Live allocations with `expires_at < now`, in no particular order.
    fn list_expired_allocations(&self, now: Timestamp) -> StateResult<Vec<Allocation>>;

    /// List live allocations.
    fn list_allocations(&self) -> StateResult<Vec<Allocation>>;

    /// Soft-delete an allocation and free its slot. Returns true if a live
    /// row was deleted.
    fn delete_allocation(&self, id: AllocationId) -> StateResult<bool>;
}
