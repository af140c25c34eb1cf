//! Identity resolution.
//!
//! The [`IdentityResolver`] maps the identity keys a configuration uses to
//! the opaque ids the remote system needs for mutations. It is built once
//! per pass from one full, paginated directory listing, after which every
//! lookup is a local map access.
//!
//! Unresolved keys are handled by change kind:
//!
//! * `Add`: minted with a random credential when auto-create is on and the
//!   scope allows it, otherwise [`ReconcileError::IdentityNotFound`]
//! * `Update`: always [`ReconcileError::IdentityNotFound`]
//! * `Remove`: dropped and reported as skipped; the identity was deleted
//!   out-of-band and removal is already achieved
//!
//! A user can be named by email or by login, so two keys may reach the same
//! remote principal. Within one set that is an error
//! ([`ReconcileError::AliasedIdentity`]). Across sets, an add and a remove
//! that resolve to the same id are the same member under a new key: they
//! collapse into an update when the role changed and vanish otherwise.

use crate::diff::{Change, ChangeKind, RoleTracking};
use crate::error::{ReconcileError, ReconcileResult, SetKind};
use crate::membership::MembershipSet;
use crate::principal::{IdentityKey, Principal, RemoteId};
use crate::remote::{DirectoryEntry, IdentityDirectory};
use crate::scope::ReconciliationScope;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use log::{debug, trace, warn};
use rand::RngCore;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tokio_util::sync::CancellationToken;

/// How a scope's identity keys map to remote ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStrategy {
    /// Look keys up in a paginated directory listing.
    Directory,
    /// The key is the remote id; nothing is listed.
    IdentityIsRemoteId,
}

/// Initial secret for an auto-created identity.
///
/// The value never appears in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Number of random bytes behind a generated credential.
    pub const RANDOM_BYTES: usize = 64;

    /// Generate a credential from 64 random bytes, base64 encoded.
    pub fn random() -> Self {
        let mut bytes = [0u8; Self::RANDOM_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(STANDARD.encode(bytes))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Changes ready to apply, plus what resolution did on the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Changes with their remote ids filled in, in input order.
    pub changes: Vec<Change>,
    /// Removals dropped because their identity no longer exists.
    pub skipped: Vec<Change>,
    /// Identities minted by auto-create.
    pub created: Vec<Principal>,
}

/// Identity-key to remote-id index for one pass.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    strategy: ResolutionStrategy,
    index: HashMap<IdentityKey, RemoteId>,
}

impl IdentityResolver {
    /// Build the resolver a scope needs, listing the directory if required.
    pub async fn for_scope<D: IdentityDirectory>(
        directory: &D,
        scope: &ReconciliationScope,
        page_size: usize,
        cancel: &CancellationToken,
    ) -> ReconcileResult<Self> {
        match scope.resolution_strategy() {
            ResolutionStrategy::Directory => Self::load(directory, scope, page_size, cancel).await,
            ResolutionStrategy::IdentityIsRemoteId => Ok(Self::passthrough()),
        }
    }

    /// Walk every directory page for `scope` and index the entries.
    ///
    /// Stops when the reported total is reached or a page comes back empty,
    /// whichever happens first. Any listing failure aborts with
    /// [`ReconcileError::RemoteUnavailable`]; cancellation is checked before
    /// each page request.
    pub async fn load<D: IdentityDirectory>(
        directory: &D,
        scope: &ReconciliationScope,
        page_size: usize,
        cancel: &CancellationToken,
    ) -> ReconcileResult<Self> {
        let page_size = page_size.max(1);
        let mut resolver = Self::from_entries(Vec::new());
        let mut offset = 0;

        loop {
            if cancel.is_cancelled() {
                debug!("Cancelled while listing {} at offset {}", scope, offset);
                return Err(ReconcileError::Cancelled {
                    applied: Vec::new(),
                });
            }
            let page = directory
                .list_page(scope, offset, page_size)
                .await
                .map_err(|source| ReconcileError::RemoteUnavailable {
                    scope: scope.to_string(),
                    source,
                })?;
            trace!(
                "Directory page for {} at offset {}: {} entries of {}",
                scope,
                offset,
                page.len(),
                page.total
            );

            if page.is_empty() {
                break;
            }
            offset += page.len();
            let total = page.total;
            for entry in page.items {
                resolver.index_entry(entry);
            }
            if offset >= total {
                break;
            }
        }

        debug!(
            "Indexed {} identity keys for {}",
            resolver.index.len(),
            scope
        );
        Ok(resolver)
    }

    /// Resolver for scopes whose keys are their remote ids.
    pub fn passthrough() -> Self {
        Self {
            strategy: ResolutionStrategy::IdentityIsRemoteId,
            index: HashMap::new(),
        }
    }

    /// Directory resolver over already-fetched entries.
    pub fn from_entries(entries: impl IntoIterator<Item = DirectoryEntry>) -> Self {
        let mut resolver = Self {
            strategy: ResolutionStrategy::Directory,
            index: HashMap::new(),
        };
        for entry in entries {
            resolver.index_entry(entry);
        }
        resolver
    }

    fn index_entry(&mut self, entry: DirectoryEntry) {
        for identity in &entry.identities {
            let Ok(key) = IdentityKey::new(identity) else {
                trace!("Skipping blank identity on {}", entry.remote_id);
                continue;
            };
            match self.index.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(entry.remote_id.clone());
                }
                Entry::Occupied(existing) if existing.get() != &entry.remote_id => {
                    warn!(
                        "Identity '{}' matches both {} and {}; keeping {}",
                        existing.key(),
                        existing.get(),
                        entry.remote_id,
                        existing.get()
                    );
                }
                Entry::Occupied(_) => {}
            }
        }
    }

    pub fn strategy(&self) -> ResolutionStrategy {
        self.strategy
    }

    /// Number of indexed keys. Always zero for a passthrough resolver.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Look a key up. Never calls the remote.
    pub fn resolve(&self, key: &IdentityKey) -> Option<RemoteId> {
        match self.strategy {
            ResolutionStrategy::Directory => self.index.get(key).cloned(),
            ResolutionStrategy::IdentityIsRemoteId => Some(RemoteId::new(key.as_str())),
        }
    }

    /// Fail if two keys of `set` reach the same remote principal.
    ///
    /// A principal's recorded remote id wins over a directory lookup. Keys
    /// that do not resolve are ignored here.
    pub fn check_aliases(&self, kind: SetKind, set: &MembershipSet) -> ReconcileResult<()> {
        let mut seen: HashMap<RemoteId, &IdentityKey> = HashMap::new();
        for principal in set {
            let key = principal.identity_key();
            let Some(remote_id) = principal
                .remote_id()
                .cloned()
                .or_else(|| self.resolve(key))
            else {
                continue;
            };
            match seen.entry(remote_id) {
                Entry::Vacant(slot) => {
                    slot.insert(key);
                }
                Entry::Occupied(first) => {
                    return Err(ReconcileError::AliasedIdentity {
                        key: first.get().to_string(),
                        alias: key.to_string(),
                        set: kind,
                    });
                }
            }
        }
        Ok(())
    }

    /// Attach remote ids to `changes`, auto-creating add targets if allowed.
    ///
    /// Cancellation is checked before each identity creation; nothing has
    /// been mutated yet at that point, so a cancelled resolution reports no
    /// applied changes.
    pub async fn resolve_changes<D: IdentityDirectory>(
        &mut self,
        directory: &D,
        scope: &ReconciliationScope,
        changes: Vec<Change>,
        auto_create: bool,
        cancel: &CancellationToken,
    ) -> ReconcileResult<Resolution> {
        let may_create = auto_create && scope.supports_auto_create();
        let mut resolution = Resolution::default();

        for mut change in changes {
            let key = change.identity_key().clone();

            if let Some(remote_id) = self.resolve(&key) {
                change.principal_mut().set_remote_id(remote_id);
                resolution.changes.push(change);
                continue;
            }

            match change.kind() {
                ChangeKind::Remove => {
                    warn!(
                        "'{}' no longer exists in {}; skipping removal",
                        key, scope
                    );
                    resolution.skipped.push(change);
                }
                ChangeKind::Add if may_create => {
                    if cancel.is_cancelled() {
                        return Err(ReconcileError::Cancelled {
                            applied: Vec::new(),
                        });
                    }
                    let credential = Credential::random();
                    let remote_id = directory
                        .create_identity(&key, &credential)
                        .await
                        .map_err(|source| ReconcileError::IdentityCreateFailed {
                            key: key.to_string(),
                            source,
                        })?;
                    debug!("Auto-created '{}' as {}", key, remote_id);

                    self.index.insert(key, remote_id.clone());
                    change.principal_mut().set_remote_id(remote_id);
                    resolution.created.push(change.principal().clone());
                    resolution.changes.push(change);
                }
                kind => {
                    return Err(ReconcileError::IdentityNotFound {
                        key: key.to_string(),
                        kind,
                    });
                }
            }
        }

        resolution.changes = merge_renamed(resolution.changes, scope.role_tracking());
        Ok(resolution)
    }
}

/// Collapse each add/remove pair that targets one remote id.
///
/// Adds precede removes in a diff, so every paired remove is known by the
/// time it is reached.
fn merge_renamed(changes: Vec<Change>, role_tracking: RoleTracking) -> Vec<Change> {
    let removed: HashMap<RemoteId, Principal> = changes
        .iter()
        .filter_map(|change| match change {
            Change::Remove(principal) => principal
                .remote_id()
                .map(|id| (id.clone(), principal.clone())),
            _ => None,
        })
        .collect();
    if removed.is_empty() {
        return changes;
    }

    let mut paired: HashSet<IdentityKey> = HashSet::new();
    let mut merged = Vec::with_capacity(changes.len());
    for change in changes {
        match change {
            Change::Add(principal) => {
                let current = principal.remote_id().and_then(|id| removed.get(id));
                let Some(current) = current else {
                    merged.push(Change::Add(principal));
                    continue;
                };
                debug!(
                    "'{}' and '{}' are the same member",
                    principal.identity_key(),
                    current.identity_key()
                );
                paired.insert(current.identity_key().clone());
                if role_tracking == RoleTracking::Tracked && current.role() != principal.role() {
                    merged.push(Change::Update(principal));
                }
            }
            Change::Remove(principal) if paired.contains(principal.identity_key()) => {}
            other => merged.push(other),
        }
    }
    merged
}
