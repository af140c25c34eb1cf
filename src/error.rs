//! Error types for reconciliation passes.
//!
//! Every failure a reconciliation pass can surface is a [`ReconcileError`].
//! Errors coming back from the remote collaborators are [`RemoteError`]
//! values and are wrapped with the context of the step that produced them.
//!
//! Only two remote outcomes are never surfaced: a conflict on add (the
//! principal is already a member) and a not-found on remove (the principal is
//! already gone). Both mean the remote system already has the desired shape.

use crate::diff::{Change, ChangeKind};
use crate::remote::RemoteError;
use std::fmt;

/// Which membership set an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetKind {
    /// The last confirmed applied state.
    Recorded,
    /// The user-declared target state.
    Desired,
    /// State read back from the remote system.
    Observed,
}

impl fmt::Display for SetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SetKind::Recorded => "recorded",
            SetKind::Desired => "desired",
            SetKind::Observed => "observed",
        };
        f.write_str(name)
    }
}

/// Main error type for reconciliation operations.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The same identity key appears twice in one set
    #[error("Identity '{key}' cannot be specified multiple times in the {set} set")]
    DuplicateIdentity { key: String, set: SetKind },

    /// Two keys in one set resolve to the same remote principal
    #[error("Identities '{key}' and '{alias}' refer to the same remote principal in the {set} set")]
    AliasedIdentity {
        key: String,
        alias: String,
        set: SetKind,
    },

    /// An identity string failed validation
    #[error("Invalid identity: {message}")]
    InvalidIdentity { message: String },

    /// An add or update target does not exist remotely and auto-create is off
    #[error("Cannot {kind} '{key}': identity does not exist in the remote system")]
    IdentityNotFound { key: String, kind: ChangeKind },

    /// Auto-create was attempted for an add target and the remote refused it
    #[error("Failed to create identity '{key}': {source}")]
    IdentityCreateFailed {
        key: String,
        #[source]
        source: RemoteError,
    },

    /// A mutation failed for a reason other than the tolerated conflict/not-found cases
    #[error("Failed to {change}: {source}")]
    MutationFailed {
        change: Change,
        applied: Vec<Change>,
        #[source]
        source: RemoteError,
    },

    /// An update or removal reached the applier without a remote id or role
    #[error("Cannot apply {change}: identity was not resolved")]
    UnresolvedChange {
        change: Change,
        applied: Vec<Change>,
    },

    /// Listing the remote directory or memberships failed
    #[error("Remote system unavailable while reading {scope}: {source}")]
    RemoteUnavailable {
        scope: String,
        #[source]
        source: RemoteError,
    },

    /// Cancellation was observed between steps
    #[error("Reconciliation cancelled before all changes were applied")]
    Cancelled { applied: Vec<Change> },
}

impl ReconcileError {
    /// Create a duplicate-identity error.
    pub fn duplicate(key: impl Into<String>, set: SetKind) -> Self {
        Self::DuplicateIdentity {
            key: key.into(),
            set,
        }
    }

    /// Create an invalid-identity error.
    pub fn invalid_identity(message: impl Into<String>) -> Self {
        Self::InvalidIdentity {
            message: message.into(),
        }
    }

    /// Changes that reached the remote system before the error, if any.
    ///
    /// A failed pass leaves the remote partially converged; the next pass
    /// re-diffs against that state and finishes the job.
    pub fn applied_changes(&self) -> &[Change] {
        match self {
            Self::MutationFailed { applied, .. }
            | Self::UnresolvedChange { applied, .. }
            | Self::Cancelled { applied } => applied,
            _ => &[],
        }
    }

    /// The remote error underlying this failure, if any.
    pub fn remote_error(&self) -> Option<&RemoteError> {
        match self {
            Self::IdentityCreateFailed { source, .. }
            | Self::MutationFailed { source, .. }
            | Self::RemoteUnavailable { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether re-running the whole pass could succeed without user action.
    ///
    /// Configuration errors and unresolved identities are never transient.
    /// Remote failures are transient when the remote error itself is.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RemoteUnavailable { source, .. } | Self::MutationFailed { source, .. } => {
                source.is_transient()
            }
            _ => false,
        }
    }
}

/// Result type for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;
