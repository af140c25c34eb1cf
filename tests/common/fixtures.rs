//! Scopes and seeded remotes used across the suites.

use membership_reconciler::remote::InMemoryRemote;
use membership_reconciler::scope::{PrincipalKind, ReconciliationScope};
use membership_reconciler::{RemoteId, Role};

pub const ORG_ID: i64 = 1;

pub fn org_scope() -> ReconciliationScope {
    ReconciliationScope::Organization { org_id: ORG_ID }
}

pub fn team_scope(team_id: i64) -> ReconciliationScope {
    ReconciliationScope::Team {
        org_id: ORG_ID,
        team_id,
    }
}

pub fn external_groups_scope(team_id: i64) -> ReconciliationScope {
    ReconciliationScope::TeamExternalGroups {
        org_id: ORG_ID,
        team_id,
    }
}

pub fn role_scope(role_uid: &str, principal_kind: PrincipalKind) -> ReconciliationScope {
    ReconciliationScope::RoleAssignment {
        org_id: ORG_ID,
        role_uid: role_uid.to_string(),
        principal_kind,
    }
}

/// A remote whose directory holds alice, bob and carol.
pub async fn remote_with_users() -> InMemoryRemote {
    let remote = InMemoryRemote::new();
    for login in ["alice", "bob", "carol"] {
        remote
            .add_user(&format!("{}@example.com", login), login)
            .await;
    }
    remote
}

/// Register `email` and make it a member of `scope` with `role`.
pub async fn seed_user(
    remote: &InMemoryRemote,
    scope: &ReconciliationScope,
    email: &str,
    role: Option<Role>,
) -> RemoteId {
    let id = match remote.lookup(PrincipalKind::User, email).await {
        Some(id) => id,
        None => {
            let login = email.split('@').next().unwrap_or(email);
            remote.add_user(email, login).await
        }
    };
    remote.seed_member(scope, &id, role).await;
    id
}
