//! Change applier.
//!
//! Executes a resolved change list against a [`MembershipMutator`], one call
//! per change, in order. Two remote answers count as success: a conflict on
//! add (already a member) and a not-found on remove (already gone). Any other
//! failure stops the batch and reports the changes that did land.

use crate::diff::Change;
use crate::error::{ReconcileError, ReconcileResult};
use crate::principal::{Principal, RemoteId, Role};
use crate::remote::{MembershipMutator, RemoteError};
use crate::scope::ReconciliationScope;
use log::{debug, info};
use tokio_util::sync::CancellationToken;

/// What happened to a batch that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Every change the remote now reflects, in application order.
    pub applied: Vec<Change>,
    /// Adds answered with a conflict.
    pub already_present: usize,
    /// Removes answered with not-found.
    pub already_absent: usize,
}

/// The remote call a change turns into.
enum Mutation<'c> {
    Add(&'c Principal),
    Update(&'c RemoteId, &'c Role),
    Remove(&'c RemoteId),
}

impl<'c> Mutation<'c> {
    /// `None` when an update or removal lacks what the remote needs.
    fn of(change: &'c Change) -> Option<Self> {
        match change {
            Change::Add(principal) => Some(Mutation::Add(principal)),
            Change::Update(principal) => {
                Some(Mutation::Update(principal.remote_id()?, principal.role()?))
            }
            Change::Remove(principal) => Some(Mutation::Remove(principal.remote_id()?)),
        }
    }
}

pub struct ChangeApplier<'a, M> {
    mutator: &'a M,
    cancel: CancellationToken,
}

impl<'a, M: MembershipMutator> ChangeApplier<'a, M> {
    pub fn new(mutator: &'a M, cancel: CancellationToken) -> Self {
        Self { mutator, cancel }
    }

    /// Apply `changes` to `scope` sequentially.
    ///
    /// Cancellation is checked before each call; an in-flight call is never
    /// interrupted. There is no rollback on failure.
    pub async fn apply(
        &self,
        scope: &ReconciliationScope,
        changes: Vec<Change>,
    ) -> ReconcileResult<ApplyOutcome> {
        let mut outcome = ApplyOutcome::default();

        for change in changes {
            if self.cancel.is_cancelled() {
                info!(
                    "Cancelled after {} changes to {}",
                    outcome.applied.len(),
                    scope
                );
                return Err(ReconcileError::Cancelled {
                    applied: outcome.applied,
                });
            }

            let Some(mutation) = Mutation::of(&change) else {
                return Err(ReconcileError::UnresolvedChange {
                    change,
                    applied: outcome.applied,
                });
            };

            debug!("Applying {} to {}", change, scope);
            match self.issue(scope, mutation).await {
                Ok(()) => {}
                Err(error) if matches!(change, Change::Add(_)) && error.is_conflict() => {
                    debug!("{} is already a member of {}", change.principal(), scope);
                    outcome.already_present += 1;
                }
                Err(error) if matches!(change, Change::Remove(_)) && error.is_not_found() => {
                    debug!("{} is already gone from {}", change.principal(), scope);
                    outcome.already_absent += 1;
                }
                Err(source) => {
                    return Err(ReconcileError::MutationFailed {
                        change,
                        applied: outcome.applied,
                        source,
                    });
                }
            }
            outcome.applied.push(change);
        }

        Ok(outcome)
    }

    async fn issue(
        &self,
        scope: &ReconciliationScope,
        mutation: Mutation<'_>,
    ) -> Result<(), RemoteError> {
        match mutation {
            Mutation::Add(principal) => self.mutator.mutate_add(scope, principal).await,
            Mutation::Update(remote_id, role) => {
                self.mutator.mutate_update(scope, remote_id, role).await
            }
            Mutation::Remove(remote_id) => self.mutator.mutate_remove(scope, remote_id).await,
        }
    }
}
