//! Shared types used across Gamebox crates.

use serde::{Deserialize, Serialize};

/// Unix epoch seconds.
pub type Timestamp = u64;

/// Boundary of the admission-control rule for allocations.
///
/// An allocation occupies one "slot"; a second live allocation for the
/// same slot is rejected by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationScope {
    /// One live allocation per (account, template) pair.
    #[default]
    PerTemplate,
    /// One live allocation per account, regardless of template.
    PerAccount,
}

impl AllocationScope {
    /// Build the slot key an allocation for `(account_id, template_id)` occupies.
    pub fn slot_key(&self, account_id: u64, template_id: u64) -> String {
        match self {
            AllocationScope::PerTemplate => format!("{account_id}:{template_id}"),
            AllocationScope::PerAccount => format!("{account_id}"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationScope::PerTemplate => "per_template",
            AllocationScope::PerAccount => "per_account",
        }
    }

    /// Inverse of [`AllocationScope::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "per_template" => Some(AllocationScope::PerTemplate),
            "per_account" => Some(AllocationScope::PerAccount),
            _ => None,
        }
    }
}

impl std::fmt::Display for AllocationScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_key_per_template_includes_both_ids() {
        let scope = AllocationScope::PerTemplate;
        assert_eq!(scope.slot_key(3, 7), "3:7");
        assert_ne!(scope.slot_key(3, 7), scope.slot_key(3, 8));
    }

    #[test]
    fn slot_key_per_account_ignores_template() {
        let scope = AllocationScope::PerAccount;
        assert_eq!(scope.slot_key(3, 7), scope.slot_key(3, 8));
    }

    #[test]
    fn scope_names_parse_back() {
        for scope in [AllocationScope::PerTemplate, AllocationScope::PerAccount] {
            assert_eq!(AllocationScope::parse(scope.as_str()), Some(scope));
        }
        assert_eq!(AllocationScope::parse("per_region"), None);
    }

    #[test]
    fn default_scope_is_per_template() {
        assert_eq!(AllocationScope::default(), AllocationScope::PerTemplate);
    }

    #[test]
    fn epoch_secs_returns_reasonable_value() {
        // Should be after 2024-01-01.
        assert!(epoch_secs() > 1_704_067_200);
    }
}
