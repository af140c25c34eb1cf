//! In-process remote for tests, benches and dry runs.
//!
//! [`InMemoryRemote`] implements all three collaborator traits over shared
//! state behind an async `RwLock`. It keeps a user/team/service-account
//! directory, one membership table per scope, and a log of every call so
//! tests can assert exactly which remote operations a pass issued.
//!
//! # Remote Semantics
//!
//! * Adding an existing member fails with [`RemoteError::Conflict`]
//! * Updating or removing a non-member fails with [`RemoteError::NotFound`]
//! * Listings are paginated in ascending id order and report a `total`
//! * Deleting a user out-of-band also drops it from every scope
//!
//! # Failure Injection
//!
//! [`fail_nth_mutation`](InMemoryRemote::fail_nth_mutation) makes a future
//! mutation fail once; [`fail_listing`](InMemoryRemote::fail_listing) makes
//! every directory and membership listing fail until cleared.
//!
//! # Example Usage
//!
//! ```rust
//! use membership_reconciler::principal::Role;
//! use membership_reconciler::remote::{InMemoryRemote, MembershipReader};
//! use membership_reconciler::scope::ReconciliationScope;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let remote = InMemoryRemote::new();
//! let scope = ReconciliationScope::Organization { org_id: 1 };
//!
//! let alice = remote.add_user("alice@example.com", "alice").await;
//! remote.seed_member(&scope, &alice, Some(Role::Editor)).await;
//!
//! let members = remote.list_members(&scope).await?;
//! assert_eq!(members.len(), 1);
//! assert_eq!(members[0].identity_key, "alice@example.com");
//! # Ok(())
//! # }
//! ```

use super::{
    DirectoryEntry, IdentityDirectory, MembershipMutator, MembershipReader, Page, RemoteError,
    RemoteMember,
};
use crate::identity::Credential;
use crate::principal::{IdentityKey, Principal, RemoteId, Role};
use crate::scope::{PrincipalKind, ReconciliationScope};
use log::{debug, trace};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A call observed by [`InMemoryRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    ListPage {
        scope: ReconciliationScope,
        offset: usize,
    },
    CreateIdentity {
        key: String,
    },
    Add {
        scope: ReconciliationScope,
        key: String,
    },
    Update {
        scope: ReconciliationScope,
        remote_id: RemoteId,
        role: Role,
    },
    Remove {
        scope: ReconciliationScope,
        remote_id: RemoteId,
    },
    ListMembers {
        scope: ReconciliationScope,
    },
}

impl RemoteCall {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            RemoteCall::Add { .. } | RemoteCall::Update { .. } | RemoteCall::Remove { .. }
        )
    }
}

#[derive(Debug, Clone)]
struct DirectoryRecord {
    kind: PrincipalKind,
    /// Email for users, name for teams and service accounts.
    primary: String,
    login: Option<String>,
}

#[derive(Debug, Clone)]
struct MemberRecord {
    role: Option<Role>,
    labels: Vec<String>,
}

#[derive(Debug, Default)]
struct RemoteState {
    next_id: i64,
    directory: BTreeMap<i64, DirectoryRecord>,
    memberships: HashMap<ReconciliationScope, BTreeMap<RemoteId, MemberRecord>>,
    calls: Vec<RemoteCall>,
    pending_failure: Option<(usize, RemoteError)>,
    listing_failure: Option<RemoteError>,
    create_failure: Option<RemoteError>,
}

impl RemoteState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn insert_identity(
        &mut self,
        kind: PrincipalKind,
        primary: &str,
        login: Option<&str>,
    ) -> RemoteId {
        let id = self.allocate_id();
        self.directory.insert(
            id,
            DirectoryRecord {
                kind,
                primary: primary.to_string(),
                login: login.map(str::to_string),
            },
        );
        RemoteId::from(id)
    }

    /// Find a directory id by any of the record's keys.
    fn lookup(&self, kind: PrincipalKind, key: &str) -> Option<RemoteId> {
        self.directory
            .iter()
            .find(|(_, record)| {
                record.kind == kind
                    && (record.primary == key || record.login.as_deref() == Some(key))
            })
            .map(|(id, _)| RemoteId::from(*id))
    }

    /// Consume the injected mutation failure when its turn comes.
    fn take_mutation_failure(&mut self) -> Option<RemoteError> {
        match self.pending_failure.take() {
            Some((0, error)) => Some(error),
            Some((remaining, error)) => {
                self.pending_failure = Some((remaining - 1, error));
                None
            }
            None => None,
        }
    }

    fn member_key(&self, scope: &ReconciliationScope, remote_id: &RemoteId) -> String {
        if scope.principal_kind().is_none() {
            return remote_id.to_string();
        }
        remote_id
            .as_i64()
            .and_then(|id| self.directory.get(&id))
            .map(|record| record.primary.clone())
            .unwrap_or_else(|| remote_id.to_string())
    }
}

/// Thread-safe in-memory implementation of the remote collaborators.
///
/// Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRemote {
    state: Arc<RwLock<RemoteState>>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user in the directory.
    pub async fn add_user(&self, email: &str, login: &str) -> RemoteId {
        let mut state = self.state.write().await;
        state.insert_identity(PrincipalKind::User, email, Some(login))
    }

    pub async fn add_team(&self, name: &str) -> RemoteId {
        let mut state = self.state.write().await;
        state.insert_identity(PrincipalKind::Team, name, None)
    }

    pub async fn add_service_account(&self, name: &str) -> RemoteId {
        let mut state = self.state.write().await;
        state.insert_identity(PrincipalKind::ServiceAccount, name, None)
    }

    /// Delete an identity out-of-band, dropping it from every scope.
    pub async fn delete_identity(&self, remote_id: &RemoteId) -> bool {
        let mut state = self.state.write().await;
        let existed = remote_id
            .as_i64()
            .and_then(|id| state.directory.remove(&id))
            .is_some();
        for members in state.memberships.values_mut() {
            members.remove(remote_id);
        }
        existed
    }

    /// Put a member into a scope without going through the mutation API.
    pub async fn seed_member(&self, scope: &ReconciliationScope, remote_id: &RemoteId, role: Option<Role>) {
        self.seed_member_with_labels(scope, remote_id, role, Vec::new())
            .await;
    }

    /// Seed a member carrying sync labels.
    pub async fn seed_member_with_labels(
        &self,
        scope: &ReconciliationScope,
        remote_id: &RemoteId,
        role: Option<Role>,
        labels: Vec<String>,
    ) {
        let mut state = self.state.write().await;
        state
            .memberships
            .entry(scope.clone())
            .or_default()
            .insert(remote_id.clone(), MemberRecord { role, labels });
    }

    /// Current members of a scope as `(key, role)` pairs in key order.
    pub async fn members(&self, scope: &ReconciliationScope) -> Vec<(String, Option<Role>)> {
        let state = self.state.read().await;
        let mut members: Vec<(String, Option<Role>)> = state
            .memberships
            .get(scope)
            .map(|table| {
                table
                    .iter()
                    .map(|(id, record)| (state.member_key(scope, id), record.role.clone()))
                    .collect()
            })
            .unwrap_or_default();
        members.sort();
        members
    }

    /// Resolve a directory key the way the remote lookup endpoint does.
    pub async fn lookup(&self, kind: PrincipalKind, key: &str) -> Option<RemoteId> {
        self.state.read().await.lookup(kind, key)
    }

    /// Fail the mutation `n` calls from now (0 is the next one), once.
    pub async fn fail_nth_mutation(&self, n: usize, error: RemoteError) {
        self.state.write().await.pending_failure = Some((n, error));
    }

    pub async fn fail_next_mutation(&self, error: RemoteError) {
        self.fail_nth_mutation(0, error).await;
    }

    /// Fail every listing until cleared with `None`.
    pub async fn fail_listing(&self, error: Option<RemoteError>) {
        self.state.write().await.listing_failure = error;
    }

    /// Fail every identity creation until cleared with `None`.
    pub async fn fail_identity_creation(&self, error: Option<RemoteError>) {
        self.state.write().await.create_failure = error;
    }

    /// Every call received so far.
    pub async fn calls(&self) -> Vec<RemoteCall> {
        self.state.read().await.calls.clone()
    }

    /// Only the add/update/remove calls received so far.
    pub async fn mutation_calls(&self) -> Vec<RemoteCall> {
        self.state
            .read()
            .await
            .calls
            .iter()
            .filter(|call| call.is_mutation())
            .cloned()
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.state.write().await.calls.clear();
    }
}

impl IdentityDirectory for InMemoryRemote {
    async fn list_page(
        &self,
        scope: &ReconciliationScope,
        offset: usize,
        limit: usize,
    ) -> Result<Page<DirectoryEntry>, RemoteError> {
        let mut state = self.state.write().await;
        state.calls.push(RemoteCall::ListPage {
            scope: scope.clone(),
            offset,
        });
        if let Some(error) = state.listing_failure.clone() {
            return Err(error);
        }

        let Some(kind) = scope.principal_kind() else {
            return Ok(Page::new(Vec::new(), 0));
        };

        let matching: Vec<DirectoryEntry> = state
            .directory
            .iter()
            .filter(|(_, record)| record.kind == kind)
            .map(|(id, record)| {
                let mut identities = vec![record.primary.clone()];
                identities.extend(record.login.iter().cloned());
                DirectoryEntry::new(RemoteId::from(*id), identities)
            })
            .collect();

        let total = matching.len();
        let items: Vec<DirectoryEntry> = matching.into_iter().skip(offset).take(limit).collect();
        trace!(
            "Listed {} of {} {} at offset {}",
            items.len(),
            total,
            kind,
            offset
        );
        Ok(Page::new(items, total))
    }

    async fn create_identity(
        &self,
        key: &IdentityKey,
        credential: &Credential,
    ) -> Result<RemoteId, RemoteError> {
        let mut state = self.state.write().await;
        state.calls.push(RemoteCall::CreateIdentity {
            key: key.to_string(),
        });
        if let Some(error) = state.create_failure.clone() {
            return Err(error);
        }
        if credential.is_empty() {
            return Err(RemoteError::status(400, "password is required"));
        }
        if state.lookup(PrincipalKind::User, key.as_str()).is_some() {
            return Err(RemoteError::conflict(format!("user '{}' already exists", key)));
        }

        let id = state.insert_identity(PrincipalKind::User, key.as_str(), Some(key.as_str()));
        debug!("Created user '{}' with id {}", key, id);
        Ok(id)
    }
}

impl MembershipMutator for InMemoryRemote {
    async fn mutate_add(
        &self,
        scope: &ReconciliationScope,
        principal: &Principal,
    ) -> Result<(), RemoteError> {
        let mut state = self.state.write().await;
        state.calls.push(RemoteCall::Add {
            scope: scope.clone(),
            key: principal.identity_key().to_string(),
        });
        if let Some(error) = state.take_mutation_failure() {
            return Err(error);
        }

        let remote_id = match (principal.remote_id(), scope.principal_kind()) {
            (Some(id), _) => id.clone(),
            (None, Some(kind)) => state
                .lookup(kind, principal.identity_key().as_str())
                .ok_or_else(|| {
                    RemoteError::not_found(format!("{} not found", principal.identity_key()))
                })?,
            (None, None) => RemoteId::new(principal.identity_key().as_str()),
        };

        let members = state.memberships.entry(scope.clone()).or_default();
        if members.contains_key(&remote_id) {
            return Err(RemoteError::conflict(format!(
                "{} is already a member of {}",
                principal.identity_key(),
                scope
            )));
        }
        members.insert(
            remote_id,
            MemberRecord {
                role: principal.role().cloned(),
                labels: Vec::new(),
            },
        );
        Ok(())
    }

    async fn mutate_update(
        &self,
        scope: &ReconciliationScope,
        remote_id: &RemoteId,
        role: &Role,
    ) -> Result<(), RemoteError> {
        let mut state = self.state.write().await;
        state.calls.push(RemoteCall::Update {
            scope: scope.clone(),
            remote_id: remote_id.clone(),
            role: role.clone(),
        });
        if let Some(error) = state.take_mutation_failure() {
            return Err(error);
        }

        match state
            .memberships
            .get_mut(scope)
            .and_then(|members| members.get_mut(remote_id))
        {
            Some(record) => {
                record.role = Some(role.clone());
                Ok(())
            }
            None => Err(RemoteError::not_found(format!(
                "{} is not a member of {}",
                remote_id, scope
            ))),
        }
    }

    async fn mutate_remove(
        &self,
        scope: &ReconciliationScope,
        remote_id: &RemoteId,
    ) -> Result<(), RemoteError> {
        let mut state = self.state.write().await;
        state.calls.push(RemoteCall::Remove {
            scope: scope.clone(),
            remote_id: remote_id.clone(),
        });
        if let Some(error) = state.take_mutation_failure() {
            return Err(error);
        }

        let removed = state
            .memberships
            .get_mut(scope)
            .and_then(|members| members.remove(remote_id))
            .is_some();
        if removed {
            Ok(())
        } else {
            Err(RemoteError::not_found(format!(
                "{} is not a member of {}",
                remote_id, scope
            )))
        }
    }
}

impl MembershipReader for InMemoryRemote {
    async fn list_members(&self, scope: &ReconciliationScope) -> Result<Vec<RemoteMember>, RemoteError> {
        let mut state = self.state.write().await;
        state.calls.push(RemoteCall::ListMembers {
            scope: scope.clone(),
        });
        if let Some(error) = state.listing_failure.clone() {
            return Err(error);
        }

        let Some(table) = state.memberships.get(scope) else {
            return Ok(Vec::new());
        };

        let members = table
            .iter()
            .map(|(remote_id, record)| {
                let login = remote_id
                    .as_i64()
                    .and_then(|id| state.directory.get(&id))
                    .and_then(|entry| entry.login.clone());
                RemoteMember {
                    identity_key: state.member_key(scope, remote_id),
                    remote_id: remote_id.clone(),
                    role: record.role.clone(),
                    login,
                    labels: record.labels.clone(),
                }
            })
            .collect();
        Ok(members)
    }
}
