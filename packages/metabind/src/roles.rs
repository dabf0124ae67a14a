//! The permission oracle: per-mode allow/deny role sets.

use std::collections::{BTreeMap, BTreeSet};

/// Wildcard role matching any caller.
pub const ANYONE: &str = "*";

/// The four gated operation modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PermissionMode {
    Create,
    Read,
    Update,
    Delete,
}

/// Role-based permission table, evaluated per `Resource` and
/// independently per `Meta`.
///
/// Deny wins over allow. An empty allow table grants every mode;
/// otherwise the mode's allow set must intersect the caller's roles.
#[derive(Clone, Debug, Default)]
pub struct Permission {
    allow: BTreeMap<PermissionMode, BTreeSet<String>>,
    deny: BTreeMap<PermissionMode, BTreeSet<String>>,
}

impl Permission {
    pub fn new() -> Self {
        Permission::default()
    }

    /// Allow `roles` for `mode`.
    #[must_use]
    pub fn allow(mut self, mode: PermissionMode, roles: &[&str]) -> Self {
        let entry = self.allow.entry(mode).or_default();
        entry.extend(roles.iter().map(|r| r.to_string()));
        self
    }

    /// Deny `roles` for `mode`. Deny wins over any allow entry.
    #[must_use]
    pub fn deny(mut self, mode: PermissionMode, roles: &[&str]) -> Self {
        let entry = self.deny.entry(mode).or_default();
        entry.extend(roles.iter().map(|r| r.to_string()));
        self
    }

    /// Evaluate the oracle for one mode and a caller's roles.
    pub fn granted(&self, mode: PermissionMode, roles: &[String]) -> bool {
        if let Some(denied) = self.deny.get(&mode) {
            if denied.contains(ANYONE) || roles.iter().any(|r| denied.contains(r.as_str())) {
                return false;
            }
        }

        if self.allow.is_empty() {
            return true;
        }

        match self.allow.get(&mode) {
            Some(allowed) => {
                allowed.contains(ANYONE) || roles.iter().any(|r| allowed.contains(r.as_str()))
            }
            None => false,
        }
    }
}
