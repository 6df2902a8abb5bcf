//! StateStore: redb-backed record persistence for Gamebox.
//!
//! Provides the account, template, and allocation repositories over a single
//! database. The store supports both on-disk and in-memory backends (the
//! latter for testing).

use std::path::Path;
use std::sync::Arc;

use gamebox_core::{AllocationScope, Timestamp, epoch_secs};
use redb::{Database, ReadableDatabase, ReadableTable, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{StateError, StateResult};
use crate::repository::{AccountRepository, AllocationRepository, TemplateRepository};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Length of generated account domain labels.
const DOMAIN_LEN: usize = 8;

/// Attempts at drawing an unused domain label before giving up.
const DOMAIN_ATTEMPTS: usize = 4;

/// Thread-safe record store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    scope: AllocationScope,
}

impl StateStore {
    /// Open (or create) a persistent record store at the given path.
    ///
    /// The store comes up under the allocation scope its slot index was last
    /// built for.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self::init(db)?;
        debug!(?path, scope = %store.scope, "record store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory record store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self::init(db)?;
        debug!("in-memory record store opened");
        Ok(store)
    }

    fn init(db: Database) -> StateResult<Self> {
        let mut store = Self {
            db: Arc::new(db),
            scope: AllocationScope::default(),
        };
        store.ensure_tables()?;
        store.scope = store.persisted_scope()?;
        Ok(store)
    }

    /// Switch the admission-control scope and rebuild the slot index to match.
    /// The new scope is persisted with the index, so a reopen under a
    /// different scope rebuilds again.
    ///
    /// When narrowing to a per-account scope finds several live allocations
    /// for one account, the oldest keeps the slot; the rest stay live but do
    /// not block anything until they are deleted.
    pub fn with_allocation_scope(mut self, scope: AllocationScope) -> StateResult<Self> {
        if scope == self.scope {
            return Ok(self);
        }
        self.scope = scope;
        self.rebuild_slots()?;
        debug!(%scope, "allocation scope set");
        Ok(self)
    }

    pub fn allocation_scope(&self) -> AllocationScope {
        self.scope
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for table in [ACCOUNTS, TEMPLATES, ALLOCATIONS] {
            txn.open_table(table).map_err(map_err!(Table))?;
        }
        for index in [
            ACCOUNT_TOKENS,
            ACCOUNT_DOMAINS,
            TEMPLATE_UIDS,
            TEMPLATE_NAMES,
            ALLOCATION_SLOTS,
            SEQUENCES,
        ] {
            txn.open_table(index).map_err(map_err!(Table))?;
        }
        txn.open_table(META).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Scope recorded alongside the slot index; a store that never changed
    /// scope has none and uses the default.
    fn persisted_scope(&self) -> StateResult<AllocationScope> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let meta = txn.open_table(META).map_err(map_err!(Table))?;
        let Some(guard) = meta.get(SCOPE_KEY).map_err(map_err!(Read))? else {
            return Ok(AllocationScope::default());
        };
        let value = guard.value();
        AllocationScope::parse(value)
            .ok_or_else(|| StateError::Invalid(format!("unknown persisted allocation scope {value}")))
    }

    fn rebuild_slots(&self) -> StateResult<()> {
        let mut live: Vec<Allocation> =
            self.scan_rows(ALLOCATIONS, |a: &Allocation| a.is_live())?;
        live.sort_by_key(|a| a.id);

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut slots = txn.open_table(ALLOCATION_SLOTS).map_err(map_err!(Table))?;
            slots.retain(|_, _| false).map_err(map_err!(Write))?;
            for alloc in &live {
                let key = self.scope.slot_key(alloc.account_id, alloc.template_id);
                let taken = slots.get(key.as_str()).map_err(map_err!(Read))?.is_some();
                if taken {
                    warn!(
                        allocation_id = alloc.id,
                        slot = %key,
                        "slot already held by an older allocation"
                    );
                    continue;
                }
                slots
                    .insert(key.as_str(), alloc.id)
                    .map_err(map_err!(Write))?;
            }
            let mut meta = txn.open_table(META).map_err(map_err!(Table))?;
            meta.insert(SCOPE_KEY, self.scope.as_str())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Read helpers ───────────────────────────────────────────────

    fn read_row<T: DeserializeOwned>(&self, table: RowTable, id: u64) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        let row = match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
            }
            None => None,
        };
        Ok(row)
    }

    /// Resolve a unique key through `index` and load the row it points to.
    fn read_indexed<T: DeserializeOwned>(
        &self,
        index: IndexTable,
        rows: RowTable,
        key: &str,
    ) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let id = {
            let index = txn.open_table(index).map_err(map_err!(Table))?;
            index.get(key).map_err(map_err!(Read))?.map(|guard| guard.value())
        };
        let Some(id) = id else {
            return Ok(None);
        };
        let rows = txn.open_table(rows).map_err(map_err!(Table))?;
        let row = match rows.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
            }
            None => None,
        };
        Ok(row)
    }

    fn scan_rows<T: DeserializeOwned>(
        &self,
        table: RowTable,
        keep: impl Fn(&T) -> bool,
    ) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let row: T = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if keep(&row) {
                results.push(row);
            }
        }
        Ok(results)
    }
}

// ── Write-transaction helpers ──────────────────────────────────────

/// Allocate the next id for a row table.
fn next_id(txn: &WriteTransaction, sequence: &str) -> StateResult<u64> {
    let mut table = txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
    let current = table
        .get(sequence)
        .map_err(map_err!(Read))?
        .map(|guard| guard.value())
        .unwrap_or(0);
    let next = current + 1;
    table.insert(sequence, next).map_err(map_err!(Write))?;
    Ok(next)
}

fn get_row<T: DeserializeOwned>(
    txn: &WriteTransaction,
    table: RowTable,
    id: u64,
) -> StateResult<Option<T>> {
    let table = txn.open_table(table).map_err(map_err!(Table))?;
    let row = match table.get(id).map_err(map_err!(Read))? {
        Some(guard) => Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?),
        None => None,
    };
    Ok(row)
}

fn put_row<T: Serialize>(txn: &WriteTransaction, table: RowTable, id: u64, row: &T) -> StateResult<()> {
    let value = serde_json::to_vec(row).map_err(map_err!(Serialize))?;
    let mut table = txn.open_table(table).map_err(map_err!(Table))?;
    table
        .insert(id, value.as_slice())
        .map_err(map_err!(Write))?;
    Ok(())
}

fn index_get(txn: &WriteTransaction, index: IndexTable, key: &str) -> StateResult<Option<u64>> {
    let table = txn.open_table(index).map_err(map_err!(Table))?;
    let id = table.get(key).map_err(map_err!(Read))?.map(|guard| guard.value());
    Ok(id)
}

fn index_put(txn: &WriteTransaction, index: IndexTable, key: &str, id: u64) -> StateResult<()> {
    let mut table = txn.open_table(index).map_err(map_err!(Table))?;
    table.insert(key, id).map_err(map_err!(Write))?;
    Ok(())
}

/// Remove `key` from `index` if it still points at `id`.
fn index_release(txn: &WriteTransaction, index: IndexTable, key: &str, id: u64) -> StateResult<()> {
    if index_get(txn, index, key)? == Some(id) {
        let mut table = txn.open_table(index).map_err(map_err!(Table))?;
        table.remove(key).map_err(map_err!(Write))?;
    }
    Ok(())
}

fn generate_domain() -> String {
    let mut domain = Uuid::new_v4().simple().to_string();
    domain.truncate(DOMAIN_LEN);
    domain
}

fn unused_domain(txn: &WriteTransaction) -> StateResult<String> {
    for _ in 0..DOMAIN_ATTEMPTS {
        let candidate = generate_domain();
        if index_get(txn, ACCOUNT_DOMAINS, &candidate)?.is_none() {
            return Ok(candidate);
        }
    }
    Err(StateError::Duplicate("account domain".to_string()))
}

fn insert_account(txn: &WriteTransaction, token: &str, now: Timestamp) -> StateResult<Account> {
    if token.is_empty() {
        return Err(StateError::Invalid("account token must not be empty".to_string()));
    }
    if index_get(txn, ACCOUNT_TOKENS, token)?.is_some() {
        return Err(StateError::Duplicate("account token".to_string()));
    }
    let domain = unused_domain(txn)?;
    let id = next_id(txn, "accounts")?;
    let account = Account {
        id,
        token: token.to_string(),
        domain,
        created_at: now,
        deleted_at: None,
    };
    put_row(txn, ACCOUNTS, id, &account)?;
    index_put(txn, ACCOUNT_TOKENS, &account.token, id)?;
    index_put(txn, ACCOUNT_DOMAINS, &account.domain, id)?;
    Ok(account)
}

fn validate_draft(draft: &TemplateDraft) -> StateResult<()> {
    let blank = [
        ("name", &draft.name),
        ("namespace", &draft.namespace),
        ("domain", &draft.domain),
    ]
    .into_iter()
    .find(|(_, value)| value.trim().is_empty());
    if let Some((field, _)) = blank {
        return Err(StateError::Invalid(format!("template {field} must not be empty")));
    }
    if draft.port == 0 {
        return Err(StateError::Invalid("template port must not be 0".to_string()));
    }
    Ok(())
}

// ── Accounts ───────────────────────────────────────────────────────

impl AccountRepository for StateStore {
    fn create_account(&self, token: &str) -> StateResult<Account> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let account = insert_account(&txn, token, epoch_secs())?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(account_id = account.id, domain = %account.domain, "account created");
        Ok(account)
    }

    fn batch_create_accounts(&self, tokens: &[String]) -> StateResult<Vec<Account>> {
        let now = epoch_secs();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut created = Vec::with_capacity(tokens.len());
        for token in tokens {
            // An early return drops `txn` uncommitted, discarding the batch.
            created.push(insert_account(&txn, token, now)?);
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(count = created.len(), "accounts created in batch");
        Ok(created)
    }

    fn get_account(&self, id: AccountId) -> StateResult<Option<Account>> {
        self.read_row(ACCOUNTS, id)
    }

    fn get_account_by_token(&self, token: &str) -> StateResult<Option<Account>> {
        self.read_indexed(ACCOUNT_TOKENS, ACCOUNTS, token)
    }

    fn get_account_by_domain(&self, domain: &str) -> StateResult<Option<Account>> {
        self.read_indexed(ACCOUNT_DOMAINS, ACCOUNTS, domain)
    }

    fn list_accounts(&self) -> StateResult<Vec<Account>> {
        self.scan_rows(ACCOUNTS, Account::is_live)
    }

    fn delete_account(&self, id: AccountId) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let Some(mut account) = get_row::<Account>(&txn, ACCOUNTS, id)? else {
            return Ok(false);
        };
        if !account.is_live() {
            return Ok(false);
        }
        account.deleted_at = Some(epoch_secs());
        put_row(&txn, ACCOUNTS, id, &account)?;
        index_release(&txn, ACCOUNT_TOKENS, &account.token, id)?;
        index_release(&txn, ACCOUNT_DOMAINS, &account.domain, id)?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(account_id = id, "account deleted");
        Ok(true)
    }
}

// ── Templates ──────────────────────────────────────────────────────

impl TemplateRepository for StateStore {
    fn create_template(&self, draft: &TemplateDraft) -> StateResult<Template> {
        validate_draft(draft)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        if index_get(&txn, TEMPLATE_NAMES, &draft.name)?.is_some() {
            return Err(StateError::Duplicate(format!("template name {}", draft.name)));
        }
        let now = epoch_secs();
        let id = next_id(&txn, "templates")?;
        let template = Template {
            id,
            uid: Uuid::new_v4().to_string(),
            name: draft.name.clone(),
            namespace: draft.namespace.clone(),
            domain: draft.domain.clone(),
            port: draft.port,
            resources: draft.resources.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        put_row(&txn, TEMPLATES, id, &template)?;
        index_put(&txn, TEMPLATE_UIDS, &template.uid, id)?;
        index_put(&txn, TEMPLATE_NAMES, &template.name, id)?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(template_id = id, uid = %template.uid, name = %template.name, "template created");
        Ok(template)
    }

    fn get_template(&self, id: TemplateId) -> StateResult<Option<Template>> {
        self.read_row(TEMPLATES, id)
    }

    fn get_template_by_uid(&self, uid: &str) -> StateResult<Option<Template>> {
        self.read_indexed(TEMPLATE_UIDS, TEMPLATES, uid)
    }

    fn list_templates(&self) -> StateResult<Vec<Template>> {
        self.scan_rows(TEMPLATES, Template::is_live)
    }

    fn update_template(&self, id: TemplateId, draft: &TemplateDraft) -> StateResult<Template> {
        validate_draft(draft)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut template = get_row::<Template>(&txn, TEMPLATES, id)?
            .filter(Template::is_live)
            .ok_or_else(|| StateError::NotFound(format!("template {id}")))?;

        if draft.name != template.name {
            if index_get(&txn, TEMPLATE_NAMES, &draft.name)?.is_some() {
                return Err(StateError::Duplicate(format!("template name {}", draft.name)));
            }
            index_release(&txn, TEMPLATE_NAMES, &template.name, id)?;
            index_put(&txn, TEMPLATE_NAMES, &draft.name, id)?;
        }

        template.name = draft.name.clone();
        template.namespace = draft.namespace.clone();
        template.domain = draft.domain.clone();
        template.port = draft.port;
        template.resources = draft.resources.clone();
        template.updated_at = epoch_secs();
        put_row(&txn, TEMPLATES, id, &template)?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(template_id = id, "template updated");
        Ok(template)
    }

    fn delete_template(&self, id: TemplateId) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let Some(mut template) = get_row::<Template>(&txn, TEMPLATES, id)? else {
            return Ok(false);
        };
        if !template.is_live() {
            return Ok(false);
        }
        template.deleted_at = Some(epoch_secs());
        put_row(&txn, TEMPLATES, id, &template)?;
        index_release(&txn, TEMPLATE_UIDS, &template.uid, id)?;
        index_release(&txn, TEMPLATE_NAMES, &template.name, id)?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(template_id = id, "template deleted");
        Ok(true)
    }
}

// ── Allocations ────────────────────────────────────────────────────

impl AllocationRepository for StateStore {
    fn create_allocation(&self, new: &NewAllocation) -> StateResult<Allocation> {
        let slot = self.scope.slot_key(new.account_id, new.template_id);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        if index_get(&txn, ALLOCATION_SLOTS, &slot)?.is_some() {
            return Err(StateError::Duplicate(format!(
                "allocation for account {} and template {}",
                new.account_id, new.template_id
            )));
        }
        let id = next_id(&txn, "allocations")?;
        let allocation = Allocation {
            id,
            account_id: new.account_id,
            template_id: new.template_id,
            namespace: new.namespace.clone(),
            name: new.name.clone(),
            address: new.address.clone(),
            created_at: new.created_at,
            expires_at: new.expires_at,
            deleted_at: None,
        };
        put_row(&txn, ALLOCATIONS, id, &allocation)?;
        index_put(&txn, ALLOCATION_SLOTS, &slot, id)?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(allocation_id = id, %slot, name = %allocation.name, "allocation stored");
        Ok(allocation)
    }

    fn get_allocation(
        &self,
        account_id: AccountId,
        template_id: TemplateId,
    ) -> StateResult<Option<Allocation>> {
        let occupant = self.slot_occupant(account_id, template_id)?;
        Ok(occupant.filter(|a| a.template_id == template_id))
    }

    fn get_allocation_by_id(&self, id: AllocationId) -> StateResult<Option<Allocation>> {
        self.read_row(ALLOCATIONS, id)
    }

    fn slot_occupant(
        &self,
        account_id: AccountId,
        template_id: TemplateId,
    ) -> StateResult<Option<Allocation>> {
        let slot = self.scope.slot_key(account_id, template_id);
        self.read_indexed(ALLOCATION_SLOTS, ALLOCATIONS, &slot)
    }

    fn list_expired_allocations(&self, now: Timestamp) -> StateResult<Vec<Allocation>> {
        self.scan_rows(ALLOCATIONS, |a: &Allocation| a.is_live() && a.is_expired(now))
    }

    fn list_allocations(&self) -> StateResult<Vec<Allocation>> {
        self.scan_rows(ALLOCATIONS, Allocation::is_live)
    }

    fn delete_allocation(&self, id: AllocationId) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let Some(mut allocation) = get_row::<Allocation>(&txn, ALLOCATIONS, id)? else {
            return Ok(false);
        };
        if !allocation.is_live() {
            return Ok(false);
        }
        allocation.deleted_at = Some(epoch_secs());
        put_row(&txn, ALLOCATIONS, id, &allocation)?;
        let slot = self
            .scope
            .slot_key(allocation.account_id, allocation.template_id);
        index_release(&txn, ALLOCATION_SLOTS, &slot, id)?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(allocation_id = id, "allocation deleted");
        Ok(true)
    }
}
