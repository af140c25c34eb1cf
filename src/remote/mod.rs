//! Remote collaborator interfaces.
//!
//! The engine never talks to the remote API directly. It consumes three
//! traits that an API client implements:
//!
//! - [`IdentityDirectory`] enumerates the identities a scope's keys resolve
//!   against, page by page, and can mint a new identity under auto-create.
//! - [`MembershipMutator`] performs the three mutation primitives.
//! - [`MembershipReader`] lists the current members of a scope, for the
//!   read-back that follows a pass.
//!
//! All three return [`RemoteError`]. The crate ships [`InMemoryRemote`], which
//! implements every trait over in-process state and mirrors the remote's
//! conflict and not-found behavior.
//!
//! # Implementing a Client
//!
//! The traits use `impl Future` returns with `Send` bounds, so implementors
//! write plain `async fn`s:
//!
//! ```rust
//! use membership_reconciler::identity::Credential;
//! use membership_reconciler::principal::{IdentityKey, RemoteId};
//! use membership_reconciler::remote::{DirectoryEntry, IdentityDirectory, Page, RemoteError};
//! use membership_reconciler::scope::ReconciliationScope;
//!
//! struct StaticDirectory(Vec<DirectoryEntry>);
//!
//! impl IdentityDirectory for StaticDirectory {
//!     async fn list_page(
//!         &self,
//!         _scope: &ReconciliationScope,
//!         offset: usize,
//!         limit: usize,
//!     ) -> Result<Page<DirectoryEntry>, RemoteError> {
//!         let items = self.0.iter().skip(offset).take(limit).cloned().collect();
//!         Ok(Page::new(items, self.0.len()))
//!     }
//!
//!     async fn create_identity(
//!         &self,
//!         key: &IdentityKey,
//!         _credential: &Credential,
//!     ) -> Result<RemoteId, RemoteError> {
//!         Err(RemoteError::status(403, format!("cannot create {}", key)))
//!     }
//! }
//! ```

pub mod errors;
pub mod in_memory;

pub use errors::RemoteError;
pub use in_memory::{InMemoryRemote, RemoteCall};

use crate::identity::Credential;
use crate::principal::{IdentityKey, Principal, RemoteId, Role};
use crate::scope::ReconciliationScope;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// One identity in a directory listing.
///
/// A user is usually reachable by several keys (email and login); each is
/// indexed to the same remote id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub remote_id: RemoteId,
    pub identities: Vec<String>,
}

impl DirectoryEntry {
    pub fn new<S: Into<String>>(remote_id: RemoteId, identities: impl IntoIterator<Item = S>) -> Self {
        Self {
            remote_id,
            identities: identities.into_iter().map(Into::into).collect(),
        }
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total number of items across all pages, as reported by the remote.
    pub total: usize,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: usize) -> Self {
        Self { items, total }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A current member of a scope as reported by the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMember {
    /// The key the configuration would use: email for users, name for teams
    /// and service accounts, group id for external groups.
    pub identity_key: String,
    pub remote_id: RemoteId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    /// Sync labels; a non-empty list marks a member managed by an external
    /// identity provider.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

impl RemoteMember {
    pub fn is_externally_synced(&self) -> bool {
        !self.labels.is_empty()
    }
}

/// Enumerates and creates the identities a scope's keys resolve against.
pub trait IdentityDirectory: Send + Sync {
    /// List one page of identities for `scope`, starting at `offset`.
    fn list_page(
        &self,
        scope: &ReconciliationScope,
        offset: usize,
        limit: usize,
    ) -> impl Future<Output = Result<Page<DirectoryEntry>, RemoteError>> + Send;

    /// Create an identity for `key` with the given initial credential.
    fn create_identity(
        &self,
        key: &IdentityKey,
        credential: &Credential,
    ) -> impl Future<Output = Result<RemoteId, RemoteError>> + Send;
}

/// The three remote mutation primitives.
///
/// Implementations report an add of an existing member as
/// [`RemoteError::Conflict`] and an update or removal of a non-member as
/// [`RemoteError::NotFound`].
pub trait MembershipMutator: Send + Sync {
    /// Add the principal to the scope with its role, if the scope tracks one.
    fn mutate_add(
        &self,
        scope: &ReconciliationScope,
        principal: &Principal,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Change a member's role.
    fn mutate_update(
        &self,
        scope: &ReconciliationScope,
        remote_id: &RemoteId,
        role: &Role,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Remove a member from the scope.
    fn mutate_remove(
        &self,
        scope: &ReconciliationScope,
        remote_id: &RemoteId,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;
}

/// Reads the current membership of a scope.
pub trait MembershipReader: Send + Sync {
    fn list_members(
        &self,
        scope: &ReconciliationScope,
    ) -> impl Future<Output = Result<Vec<RemoteMember>, RemoteError>> + Send;
}
