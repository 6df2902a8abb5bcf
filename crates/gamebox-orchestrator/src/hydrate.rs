//! Resolving allocations' weak references into full views.

use std::collections::HashMap;

use serde::Serialize;

use gamebox_state::*;

use crate::error::{OrchestratorError, OrchestratorResult};

/// An allocation together with its account and template.
#[derive(Debug, Clone, Serialize)]
pub struct AllocationView {
    pub allocation: Allocation,
    pub account: Account,
    pub template: Template,
}

/// Resolves account and template references, looking each id up at most
/// once per hydrator.
pub struct Hydrator<'a> {
    accounts: &'a dyn AccountRepository,
    templates: &'a dyn TemplateRepository,
    account_cache: HashMap<AccountId, Account>,
    template_cache: HashMap<TemplateId, Template>,
}

impl<'a> Hydrator<'a> {
    pub fn new(accounts: &'a dyn AccountRepository, templates: &'a dyn TemplateRepository) -> Self {
        Self {
            accounts,
            templates,
            account_cache: HashMap::new(),
            template_cache: HashMap::new(),
        }
    }

    /// Resolve one allocation. Soft-deleted accounts and templates still
    /// resolve; a missing row is `NotFound`.
    pub fn hydrate(&mut self, allocation: Allocation) -> OrchestratorResult<AllocationView> {
        let account = match self.account_cache.get(&allocation.account_id) {
            Some(account) => account.clone(),
            None => {
                let account = self
                    .accounts
                    .get_account(allocation.account_id)?
                    .ok_or_else(|| {
                        OrchestratorError::NotFound(format!("account {}", allocation.account_id))
                    })?;
                self.account_cache.insert(account.id, account.clone());
                account
            }
        };

        let template = match self.template_cache.get(&allocation.template_id) {
            Some(template) => template.clone(),
            None => {
                let template = self
                    .templates
                    .get_template(allocation.template_id)?
                    .ok_or_else(|| {
                        OrchestratorError::NotFound(format!("template {}", allocation.template_id))
                    })?;
                self.template_cache.insert(template.id, template.clone());
                template
            }
        };

        Ok(AllocationView {
            allocation,
            account,
            template,
        })
    }
}

/// Resolve a batch of allocations. Fails if any reference is dangling.
pub fn hydrate(
    allocations: Vec<Allocation>,
    accounts: &dyn AccountRepository,
    templates: &dyn TemplateRepository,
) -> OrchestratorResult<Vec<AllocationView>> {
    let mut hydrator = Hydrator::new(accounts, templates);
    allocations
        .into_iter()
        .map(|allocation| hydrator.hydrate(allocation))
        .collect()
}
