//! redb table definitions for the Gamebox record store.
//!
//! Row tables map a surrogate id to a JSON-serialized row. Index tables map a
//! unique key to the id of the live row holding it.

use redb::TableDefinition;

pub type RowTable = TableDefinition<'static, u64, &'static [u8]>;
pub type IndexTable = TableDefinition<'static, &'static str, u64>;
pub type MetaTable = TableDefinition<'static, &'static str, &'static str>;

/// Accounts keyed by id.
pub const ACCOUNTS: RowTable = TableDefinition::new("accounts");

/// Live accounts keyed by bearer token.
pub const ACCOUNT_TOKENS: IndexTable = TableDefinition::new("account_tokens");

/// Live accounts keyed by domain label.
pub const ACCOUNT_DOMAINS: IndexTable = TableDefinition::new("account_domains");

/// Templates keyed by id.
pub const TEMPLATES: RowTable = TableDefinition::new("templates");

/// Live templates keyed by public uid.
pub const TEMPLATE_UIDS: IndexTable = TableDefinition::new("template_uids");

/// Live templates keyed by display name.
pub const TEMPLATE_NAMES: IndexTable = TableDefinition::new("template_names");

/// Allocations keyed by id.
pub const ALLOCATIONS: RowTable = TableDefinition::new("allocations");

/// Live allocations keyed by admission slot (see `AllocationScope::slot_key`).
pub const ALLOCATION_SLOTS: IndexTable = TableDefinition::new("allocation_slots");

/// Last issued id per row table, keyed by table name.
pub const SEQUENCES: IndexTable = TableDefinition::new("sequences");

/// Store-wide settings that shape the index tables.
pub const META: MetaTable = TableDefinition::new("meta");

/// `META` key recording the scope `ALLOCATION_SLOTS` was built under.
pub const SCOPE_KEY: &str = "allocation_scope";
