//! Reconciliation reports.

use crate::diff::{Change, ChangeSummary};
use crate::principal::Principal;
use crate::scope::ReconciliationScope;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// What a successful pass did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileReport {
    /// Correlates the pass's log lines.
    pub pass_id: Uuid,
    pub scope: ReconciliationScope,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Changes the remote now reflects, in application order.
    pub applied: Vec<Change>,
    /// Removals dropped because the identity no longer exists.
    pub skipped: Vec<Change>,
    /// Identities minted by auto-create.
    pub created: Vec<Principal>,
    /// Adds the remote answered with a conflict.
    pub already_present: usize,
    /// Removes the remote answered with not-found.
    pub already_absent: usize,
}

impl ReconcileReport {
    pub(crate) fn start(pass_id: Uuid, scope: &ReconciliationScope) -> Self {
        let now = Utc::now();
        Self {
            pass_id,
            scope: scope.clone(),
            started_at: now,
            finished_at: now,
            applied: Vec::new(),
            skipped: Vec::new(),
            created: Vec::new(),
            already_present: 0,
            already_absent: 0,
        }
    }

    pub(crate) fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    /// Counts of applied changes by kind.
    pub fn summary(&self) -> ChangeSummary {
        ChangeSummary::of(&self.applied)
    }

    /// True when the pass issued no mutation and skipped nothing.
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty() && self.skipped.is_empty() && self.created.is_empty()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
