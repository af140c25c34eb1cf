//! Set differ.
//!
//! [`diff`] is a pure function from a recorded and a desired
//! [`MembershipSet`] to the list of [`Change`]s that turns one into the other.
//! It never touches the remote system and never deduplicates; sets are
//! validated when they are built.
//!
//! Output order is fixed: every change on the desired side (adds and updates)
//! in ascending key order, then every removal in ascending key order. Two runs
//! over equal input produce identical output.

use crate::membership::MembershipSet;
use crate::principal::{IdentityKey, Principal};
use serde::Serialize;
use std::fmt;

/// The three mutation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Update,
    Remove,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeKind::Add => "add",
            ChangeKind::Update => "update",
            ChangeKind::Remove => "remove",
        };
        f.write_str(name)
    }
}

/// One imperative mutation against a scope.
///
/// The principal carries the target role for `Add`/`Update`, and the remote id
/// once the identity resolver has enriched the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "principal", rename_all = "lowercase")]
pub enum Change {
    Add(Principal),
    Update(Principal),
    Remove(Principal),
}

impl Change {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Change::Add(_) => ChangeKind::Add,
            Change::Update(_) => ChangeKind::Update,
            Change::Remove(_) => ChangeKind::Remove,
        }
    }

    pub fn principal(&self) -> &Principal {
        match self {
            Change::Add(p) | Change::Update(p) | Change::Remove(p) => p,
        }
    }

    pub fn principal_mut(&mut self) -> &mut Principal {
        match self {
            Change::Add(p) | Change::Update(p) | Change::Remove(p) => p,
        }
    }

    pub fn identity_key(&self) -> &IdentityKey {
        self.principal().identity_key()
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.principal())
    }
}

/// Whether a scope's diff compares roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleTracking {
    /// Role differences produce `Update` changes.
    Tracked,
    /// Presence only; roles are never compared.
    Ignored,
}

impl From<bool> for RoleTracking {
    fn from(tracked: bool) -> Self {
        if tracked {
            RoleTracking::Tracked
        } else {
            RoleTracking::Ignored
        }
    }
}

/// Compute the changes transforming `recorded` into `desired`.
///
/// # Examples
///
/// ```rust
/// use membership_reconciler::diff::{diff, Change, RoleTracking};
/// use membership_reconciler::error::SetKind;
/// use membership_reconciler::membership::MembershipSet;
/// use membership_reconciler::principal::Role;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let recorded = MembershipSet::from_role_lists(
///         SetKind::Recorded,
///         [(Role::Admin, vec!["alice"]), (Role::Viewer, vec!["bob"])],
///     )?;
///     let desired = MembershipSet::from_role_lists(
///         SetKind::Desired,
///         [(Role::Admin, vec!["alice"]), (Role::Editor, vec!["bob"])],
///     )?;
///
///     let changes = diff(&recorded, &desired, RoleTracking::Tracked);
///     assert_eq!(changes.len(), 1);
///     assert!(matches!(&changes[0], Change::Update(p) if p.role() == Some(&Role::Editor)));
///     Ok(())
/// }
/// ```
pub fn diff(
    recorded: &MembershipSet,
    desired: &MembershipSet,
    role_tracking: RoleTracking,
) -> Vec<Change> {
    let mut changes = Vec::new();

    for wanted in desired.iter() {
        match recorded.get(wanted.identity_key().as_str()) {
            None => changes.push(Change::Add(wanted.clone())),
            Some(current) => {
                if role_tracking == RoleTracking::Tracked && current.role() != wanted.role() {
                    let mut target = wanted.clone();
                    // Keep a remote id recorded by an earlier pass.
                    if let (None, Some(id)) = (target.remote_id(), current.remote_id()) {
                        target.set_remote_id(id.clone());
                    }
                    changes.push(Change::Update(target));
                }
            }
        }
    }

    for current in recorded.iter() {
        if !desired.contains(current.identity_key().as_str()) {
            changes.push(Change::Remove(current.clone()));
        }
    }

    changes
}

/// Per-kind counts of a change list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub adds: usize,
    pub updates: usize,
    pub removes: usize,
}

impl ChangeSummary {
    pub fn of(changes: &[Change]) -> Self {
        changes.iter().fold(Self::default(), |mut summary, change| {
            match change.kind() {
                ChangeKind::Add => summary.adds += 1,
                ChangeKind::Update => summary.updates += 1,
                ChangeKind::Remove => summary.removes += 1,
            }
            summary
        })
    }

    pub fn total(&self) -> usize {
        self.adds + self.updates + self.removes
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to add, {} to update, {} to remove",
            self.adds, self.updates, self.removes
        )
    }
}
