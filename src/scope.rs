//! Reconciliation scopes and the per-class lock registry.
//!
//! A [`ReconciliationScope`] names the remote container a pass mutates. Each
//! scope belongs to a [`ScopeClass`], and [`ScopeLocks`] serializes passes by
//! class or by scope. The registry is an ordinary value handed to the
//! reconciler; two reconcilers sharing an `Arc<ScopeLocks>` serialize against
//! each other, two with separate registries do not.

use crate::diff::RoleTracking;
use crate::identity::ResolutionStrategy;
use log::trace;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// The kind of principal a role assignment targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    User,
    Team,
    ServiceAccount,
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrincipalKind::User => "users",
            PrincipalKind::Team => "teams",
            PrincipalKind::ServiceAccount => "service accounts",
        };
        f.write_str(name)
    }
}

/// A remote container whose membership is reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReconciliationScope {
    /// Users of an organization, each with a basic role.
    Organization { org_id: i64 },
    /// Users of a team.
    Team { org_id: i64, team_id: i64 },
    /// External identity-provider groups synced to a team.
    TeamExternalGroups { org_id: i64, team_id: i64 },
    /// Principals holding one role.
    RoleAssignment {
        org_id: i64,
        role_uid: String,
        principal_kind: PrincipalKind,
    },
}

/// The family a scope belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeClass {
    Organization,
    Team,
    TeamExternalGroups,
    RoleAssignment,
}

impl ReconciliationScope {
    pub fn class(&self) -> ScopeClass {
        match self {
            Self::Organization { .. } => ScopeClass::Organization,
            Self::Team { .. } => ScopeClass::Team,
            Self::TeamExternalGroups { .. } => ScopeClass::TeamExternalGroups,
            Self::RoleAssignment { .. } => ScopeClass::RoleAssignment,
        }
    }

    pub fn org_id(&self) -> i64 {
        match self {
            Self::Organization { org_id }
            | Self::Team { org_id, .. }
            | Self::TeamExternalGroups { org_id, .. }
            | Self::RoleAssignment { org_id, .. } => *org_id,
        }
    }

    /// Only organization membership carries a role per principal.
    pub fn tracks_role(&self) -> bool {
        matches!(self, Self::Organization { .. })
    }

    pub fn role_tracking(&self) -> RoleTracking {
        RoleTracking::from(self.tracks_role())
    }

    /// The directory the scope's identity keys are looked up in.
    ///
    /// `None` for external groups, whose names are their remote ids.
    pub fn principal_kind(&self) -> Option<PrincipalKind> {
        match self {
            Self::Organization { .. } | Self::Team { .. } => Some(PrincipalKind::User),
            Self::TeamExternalGroups { .. } => None,
            Self::RoleAssignment { principal_kind, .. } => Some(*principal_kind),
        }
    }

    pub fn resolution_strategy(&self) -> ResolutionStrategy {
        match self.principal_kind() {
            Some(_) => ResolutionStrategy::Directory,
            None => ResolutionStrategy::IdentityIsRemoteId,
        }
    }

    /// Whether an unresolved add may mint a new identity.
    ///
    /// Only organization users can be created on the fly; teams and service
    /// accounts are managed elsewhere.
    pub fn supports_auto_create(&self) -> bool {
        matches!(self, Self::Organization { .. })
    }
}

impl fmt::Display for ReconciliationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Organization { org_id } => write!(f, "organization {}", org_id),
            Self::Team { org_id, team_id } => write!(f, "team {}/{}", org_id, team_id),
            Self::TeamExternalGroups { org_id, team_id } => {
                write!(f, "external groups of team {}/{}", org_id, team_id)
            }
            Self::RoleAssignment {
                org_id,
                role_uid,
                principal_kind,
            } => write!(f, "{} of role {} in org {}", principal_kind, role_uid, org_id),
        }
    }
}

/// Lock registry serializing passes per scope class or per scope.
///
/// Classes listed as class-wide share one lock for every scope of the class;
/// role assignments are class-wide by default because concurrent assignment
/// writes race on the remote side. All other scopes lock individually.
///
/// Per-scope locks nobody holds or waits on are pruned on every acquire, so
/// the registry only grows with the number of concurrently active scopes.
pub struct ScopeLocks {
    class_wide: HashSet<ScopeClass>,
    class_locks: HashMap<ScopeClass, Arc<Mutex<()>>>,
    scope_locks: Mutex<HashMap<ReconciliationScope, Arc<Mutex<()>>>>,
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::with_class_wide([ScopeClass::RoleAssignment])
    }

    /// Registry where the given classes serialize class-wide.
    pub fn with_class_wide(classes: impl IntoIterator<Item = ScopeClass>) -> Self {
        let class_wide: HashSet<ScopeClass> = classes.into_iter().collect();
        let class_locks = class_wide
            .iter()
            .map(|class| (*class, Arc::new(Mutex::new(()))))
            .collect();
        Self {
            class_wide,
            class_locks,
            scope_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_class_wide(&self, class: ScopeClass) -> bool {
        self.class_wide.contains(&class)
    }

    /// Number of per-scope locks currently registered.
    pub async fn tracked_scopes(&self) -> usize {
        self.scope_locks.lock().await.len()
    }

    /// Wait for and take the lock covering `scope`.
    pub async fn acquire(&self, scope: &ReconciliationScope) -> ScopeGuard {
        let lock = match self.class_locks.get(&scope.class()) {
            Some(lock) => Arc::clone(lock),
            None => {
                let mut locks = self.scope_locks.lock().await;
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
                Arc::clone(
                    locks
                        .entry(scope.clone())
                        .or_insert_with(|| Arc::new(Mutex::new(()))),
                )
            }
        };

        trace!("Waiting for lock on {}", scope);
        let guard = lock.lock_owned().await;
        trace!("Acquired lock on {}", scope);

        ScopeGuard {
            scope: scope.clone(),
            _guard: guard,
        }
    }
}

impl Default for ScopeLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ScopeLocks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeLocks")
            .field("class_wide", &self.class_wide)
            .finish_non_exhaustive()
    }
}

/// Held lock; released on drop.
#[derive(Debug)]
pub struct ScopeGuard {
    scope: ReconciliationScope,
    _guard: OwnedMutexGuard<()>,
}

impl ScopeGuard {
    pub fn scope(&self) -> &ReconciliationScope {
        &self.scope
    }
}
