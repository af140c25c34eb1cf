//! Errors returned by remote collaborators.
//!
//! The engine only distinguishes a handful of outcomes: conflict and
//! not-found (tolerated in specific positions), and everything else. The
//! status code is kept so callers can classify retryable failures.

use std::time::Duration;

/// Errors reported by an [`IdentityDirectory`](super::IdentityDirectory),
/// [`MembershipMutator`](super::MembershipMutator) or
/// [`MembershipReader`](super::MembershipReader).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// HTTP 409: the target already exists.
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// HTTP 404: the target does not exist.
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Any other non-success status.
    #[error("Remote returned status {code}: {message}")]
    Status { code: u16, message: String },

    /// The request never produced a response.
    #[error("Transport failure: {message}")]
    Transport { message: String },

    /// The request did not complete in time.
    #[error("Request timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },
}

impl RemoteError {
    /// Build an error from a status code, mapping 404 and 409 to their variants.
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            404 => Self::NotFound { message },
            409 => Self::Conflict { message },
            _ => Self::Status { code, message },
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The HTTP status code, when the remote produced a response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Conflict { .. } => Some(409),
            Self::NotFound { .. } => Some(404),
            Self::Status { code, .. } => Some(*code),
            Self::Transport { .. } | Self::Timeout { .. } => None,
        }
    }

    /// Default transient classification: no response, 429, or any 5xx.
    ///
    /// [`RetryPolicy`](crate::retry::RetryPolicy) applies its own status
    /// patterns instead of this default.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } => true,
            Self::Status { code, .. } => *code == 429 || (500..600).contains(code),
            Self::Conflict { .. } | Self::NotFound { .. } => false,
        }
    }
}
