//! Membership sets.
//!
//! A [`MembershipSet`] maps identity keys to principals for one scope. It is
//! built from raw configuration lists and rejects duplicates at construction,
//! so a repeated key is always reported instead of silently collapsing into
//! one map entry. Iteration is ordered by key, which keeps diffs stable.

use crate::error::{ReconcileError, ReconcileResult, SetKind};
use crate::principal::{IdentityKey, Principal, Role};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// An ordered, duplicate-free set of principals keyed by identity.
///
/// # Examples
///
/// ```rust
/// use membership_reconciler::error::SetKind;
/// use membership_reconciler::membership::MembershipSet;
/// use membership_reconciler::principal::Role;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let desired = MembershipSet::from_role_lists(
///         SetKind::Desired,
///         [
///             (Role::Admin, vec!["alice@example.com"]),
///             (Role::Viewer, vec!["bob@example.com", "carol@example.com"]),
///         ],
///     )?;
///     assert_eq!(desired.len(), 3);
///
///     // The same user under two roles is a configuration error.
///     let duplicate = MembershipSet::from_role_lists(
///         SetKind::Desired,
///         [
///             (Role::Admin, vec!["alice@example.com"]),
///             (Role::Editor, vec!["alice@example.com"]),
///         ],
///     );
///     assert!(duplicate.is_err());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipSet {
    entries: BTreeMap<IdentityKey, Principal>,
}

impl MembershipSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from principals, failing on the first repeated key.
    pub fn from_principals(
        kind: SetKind,
        principals: impl IntoIterator<Item = Principal>,
    ) -> ReconcileResult<Self> {
        let mut set = Self::new();
        for principal in principals {
            set.insert(kind, principal)?;
        }
        Ok(set)
    }

    /// Build a presence-only set from identity strings.
    pub fn from_identities<S: AsRef<str>>(
        kind: SetKind,
        identities: impl IntoIterator<Item = S>,
    ) -> ReconcileResult<Self> {
        let mut set = Self::new();
        for identity in identities {
            let key = IdentityKey::new(identity)?;
            set.insert(kind, Principal::member(key))?;
        }
        Ok(set)
    }

    /// Build a role-tracking set from per-role identity lists.
    ///
    /// This is the organization form: one list of emails per role. An
    /// identity appearing in two lists, or twice in one list, is a duplicate.
    pub fn from_role_lists<S, L>(
        kind: SetKind,
        lists: impl IntoIterator<Item = (Role, L)>,
    ) -> ReconcileResult<Self>
    where
        S: AsRef<str>,
        L: IntoIterator<Item = S>,
    {
        let mut set = Self::new();
        for (role, identities) in lists {
            for identity in identities {
                let key = IdentityKey::new(identity)?;
                set.insert(kind, Principal::with_role(key, role.clone()))?;
            }
        }
        Ok(set)
    }

    /// Insert a principal, rejecting a key that is already present.
    pub fn insert(&mut self, kind: SetKind, principal: Principal) -> ReconcileResult<()> {
        match self.entries.entry(principal.identity_key().clone()) {
            Entry::Occupied(existing) => Err(ReconcileError::duplicate(
                existing.key().as_str(),
                kind,
            )),
            Entry::Vacant(slot) => {
                slot.insert(principal);
                Ok(())
            }
        }
    }

    /// Look up a principal by key.
    pub fn get(&self, key: &str) -> Option<&Principal> {
        self.entries.get(key)
    }

    /// Whether the key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of principals.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Principals in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = &Principal> {
        self.entries.values()
    }

    /// Keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &IdentityKey> {
        self.entries.keys()
    }

    /// Group identity keys by role, in key order within each role.
    ///
    /// Presence-only principals are skipped. This is the shape the
    /// organization form stores back into declarative state.
    pub fn role_lists(&self) -> BTreeMap<Role, Vec<String>> {
        let mut lists: BTreeMap<Role, Vec<String>> = BTreeMap::new();
        for principal in self.entries.values() {
            if let Some(role) = principal.role() {
                lists
                    .entry(role.clone())
                    .or_default()
                    .push(principal.identity_key().to_string());
            }
        }
        lists
    }

    /// Content fingerprint over the sorted `(key, role)` entries.
    ///
    /// Remote ids are excluded, so a set compares equal before and after
    /// resolution. Two sets with equal fingerprints produce an empty diff.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for principal in self.entries.values() {
            hasher.update(principal.identity_key().as_str().as_bytes());
            hasher.update([0x1f]);
            if let Some(role) = principal.role() {
                hasher.update(role.as_str().as_bytes());
            }
            hasher.update([0x1e]);
        }
        format!("{:x}", hasher.finalize())
    }
}

impl<'a> IntoIterator for &'a MembershipSet {
    type Item = &'a Principal;
    type IntoIter = std::collections::btree_map::Values<'a, IdentityKey, Principal>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}
