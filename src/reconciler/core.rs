//! The Reconciler and its pass logic.

use super::options::ReconcileOptions;
use super::report::ReconcileReport;
use crate::applier::ChangeApplier;
use crate::config::ReconcilerConfig;
use crate::diff::{Change, ChangeSummary, diff};
use crate::error::{ReconcileError, ReconcileResult, SetKind};
use crate::identity::IdentityResolver;
use crate::membership::MembershipSet;
use crate::principal::{IdentityKey, Principal};
use crate::remote::{IdentityDirectory, MembershipMutator, MembershipReader, RemoteMember};
use crate::retry::retry_transient;
use crate::scope::{ReconciliationScope, ScopeLocks};
use log::{debug, info};
use std::sync::Arc;
use uuid::Uuid;

/// Generic set-reconciliation engine.
///
/// One instance serves every scope class; the scope decides whether roles
/// are tracked and how identity keys resolve.
///
/// # Type Parameters
///
/// * `R` - The remote client, implementing all three collaborator traits
///
/// # Examples
///
/// ```rust
/// use membership_reconciler::principal::{IdentityKey, Principal, Role};
/// use membership_reconciler::remote::InMemoryRemote;
/// use membership_reconciler::scope::ReconciliationScope;
/// use membership_reconciler::{ReconcileOptions, Reconciler};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let remote = InMemoryRemote::new();
/// remote.add_user("alice@example.com", "alice").await;
///
/// let reconciler = Reconciler::new(remote.clone());
/// let scope = ReconciliationScope::Organization { org_id: 1 };
/// let desired = vec![Principal::with_role(IdentityKey::new("alice@example.com")?, Role::Editor)];
///
/// let report = reconciler
///     .reconcile(&scope, Vec::new(), desired, &ReconcileOptions::new())
///     .await?;
/// assert_eq!(report.summary().adds, 1);
///
/// let observed = reconciler.observe(&scope).await?;
/// assert!(observed.contains("alice@example.com"));
/// # Ok(())
/// # }
/// ```
pub struct Reconciler<R> {
    pub(super) remote: R,
    pub(super) config: ReconcilerConfig,
    pub(super) locks: Arc<ScopeLocks>,
}

impl<R> Reconciler<R>
where
    R: IdentityDirectory + MembershipMutator + MembershipReader,
{
    /// Create a reconciler with default configuration and its own locks.
    pub fn new(remote: R) -> Self {
        Self::with_config(remote, ReconcilerConfig::default())
    }

    pub fn with_config(remote: R, config: ReconcilerConfig) -> Self {
        Self {
            remote,
            config,
            locks: Arc::new(ScopeLocks::new()),
        }
    }

    /// Share a lock registry with other reconcilers.
    pub fn with_locks(mut self, locks: Arc<ScopeLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn locks(&self) -> &Arc<ScopeLocks> {
        &self.locks
    }

    /// Options carrying this reconciler's configured defaults.
    pub fn options(&self) -> ReconcileOptions {
        ReconcileOptions::from_config(&self.config)
    }

    /// Build both sets and diff them without touching the remote.
    pub fn plan(
        &self,
        scope: &ReconciliationScope,
        recorded: impl IntoIterator<Item = Principal>,
        desired: impl IntoIterator<Item = Principal>,
    ) -> ReconcileResult<Vec<Change>> {
        let recorded = MembershipSet::from_principals(SetKind::Recorded, recorded)?;
        let desired = MembershipSet::from_principals(SetKind::Desired, desired)?;
        Ok(diff(&recorded, &desired, scope.role_tracking()))
    }

    /// Run one pass from raw principal lists.
    ///
    /// Duplicate keys in either list fail the pass before any remote call.
    pub async fn reconcile(
        &self,
        scope: &ReconciliationScope,
        recorded: impl IntoIterator<Item = Principal>,
        desired: impl IntoIterator<Item = Principal>,
        options: &ReconcileOptions,
    ) -> ReconcileResult<ReconcileReport> {
        check_cancelled(options)?;
        let recorded = MembershipSet::from_principals(SetKind::Recorded, recorded)?;
        let desired = MembershipSet::from_principals(SetKind::Desired, desired)?;
        self.reconcile_sets(scope, &recorded, &desired, options)
            .await
    }

    /// Run one pass over already-built sets.
    ///
    /// Keys that reach the same remote principal are checked once the
    /// directory is loaded: within one set they fail the pass, across sets
    /// they are treated as one member.
    pub async fn reconcile_sets(
        &self,
        scope: &ReconciliationScope,
        recorded: &MembershipSet,
        desired: &MembershipSet,
        options: &ReconcileOptions,
    ) -> ReconcileResult<ReconcileReport> {
        let pass_id = Uuid::new_v4();
        let mut report = ReconcileReport::start(pass_id, scope);
        check_cancelled(options)?;

        let changes = diff(recorded, desired, scope.role_tracking());
        if changes.is_empty() {
            debug!("[{}] {} is already converged", pass_id, scope);
            return Ok(report.finish());
        }
        info!(
            "[{}] Reconciling {}: {}",
            pass_id,
            scope,
            ChangeSummary::of(&changes)
        );

        let mut resolver = IdentityResolver::for_scope(
            &self.remote,
            scope,
            self.config.page_size,
            &options.cancel,
        )
        .await?;
        resolver.check_aliases(SetKind::Recorded, recorded)?;
        resolver.check_aliases(SetKind::Desired, desired)?;
        check_cancelled(options)?;
        let resolution = resolver
            .resolve_changes(
                &self.remote,
                scope,
                changes,
                options.auto_create,
                &options.cancel,
            )
            .await?;
        report.skipped = resolution.skipped;
        report.created = resolution.created;

        check_cancelled(options)?;
        let outcome = ChangeApplier::new(&self.remote, options.cancel.clone())
            .apply(scope, resolution.changes)
            .await?;
        report.applied = outcome.applied;
        report.already_present = outcome.already_present;
        report.already_absent = outcome.already_absent;

        let report = report.finish();
        info!(
            "[{}] Reconciled {}: {} applied ({}), {} skipped, {} created",
            pass_id,
            scope,
            report.applied.len(),
            report.summary(),
            report.skipped.len(),
            report.created.len()
        );
        Ok(report)
    }

    /// Run one pass while holding the lock covering `scope`.
    pub async fn reconcile_locked(
        &self,
        scope: &ReconciliationScope,
        recorded: impl IntoIterator<Item = Principal>,
        desired: impl IntoIterator<Item = Principal>,
        options: &ReconcileOptions,
    ) -> ReconcileResult<ReconcileReport> {
        let _guard = self.locks.acquire(scope).await;
        self.reconcile(scope, recorded, desired, options).await
    }

    /// Run locked passes until one succeeds or the retry policy gives up.
    pub async fn reconcile_with_retry(
        &self,
        scope: &ReconciliationScope,
        recorded: Vec<Principal>,
        desired: Vec<Principal>,
        options: &ReconcileOptions,
    ) -> ReconcileResult<ReconcileReport> {
        retry_transient(&self.config.retry, &options.cancel, move || {
            self.reconcile_locked(scope, recorded.clone(), desired.clone(), options)
        })
        .await
    }

    /// Read the scope's current membership back from the remote.
    ///
    /// Filters applied per scope class:
    ///
    /// * organizations drop the configured admin login
    /// * teams drop ignored emails and, if configured, externally synced
    ///   members
    ///
    /// Roles are kept only for role-tracking scopes.
    pub async fn observe(&self, scope: &ReconciliationScope) -> ReconcileResult<MembershipSet> {
        let members = self
            .remote
            .list_members(scope)
            .await
            .map_err(|source| ReconcileError::RemoteUnavailable {
                scope: scope.to_string(),
                source,
            })?;

        let mut observed = MembershipSet::new();
        for member in members {
            if !self.is_observed(scope, &member) {
                debug!("Ignoring {} when observing {}", member.identity_key, scope);
                continue;
            }

            let key = match member.login.as_deref() {
                Some(login) if member.identity_key.trim().is_empty() => IdentityKey::new(login)?,
                _ => IdentityKey::new(&member.identity_key)?,
            };
            let principal = match member.role {
                Some(role) if scope.tracks_role() => Principal::with_role(key, role),
                _ => Principal::member(key),
            };
            observed.insert(SetKind::Observed, principal.with_remote_id(member.remote_id))?;
        }
        Ok(observed)
    }

    fn is_observed(&self, scope: &ReconciliationScope, member: &RemoteMember) -> bool {
        match scope {
            ReconciliationScope::Organization { .. } => match &self.config.admin_user {
                Some(admin) => member.login.as_deref() != Some(admin.as_str()),
                None => true,
            },
            ReconciliationScope::Team { .. } => {
                let ignored = self
                    .config
                    .ignored_member_emails
                    .iter()
                    .any(|email| email == &member.identity_key);
                let synced =
                    self.config.ignore_externally_synced_members && member.is_externally_synced();
                !ignored && !synced
            }
            ReconciliationScope::TeamExternalGroups { .. }
            | ReconciliationScope::RoleAssignment { .. } => true,
        }
    }
}

fn check_cancelled(options: &ReconcileOptions) -> ReconcileResult<()> {
    if options.is_cancelled() {
        return Err(ReconcileError::Cancelled {
            applied: Vec::new(),
        });
    }
    Ok(())
}
