//! Per-pass options.

use crate::config::ReconcilerConfig;
use tokio_util::sync::CancellationToken;

/// Options for one reconciliation pass.
///
/// # Examples
///
/// ```rust
/// use membership_reconciler::ReconcileOptions;
/// use tokio_util::sync::CancellationToken;
///
/// let cancel = CancellationToken::new();
/// let options = ReconcileOptions::new()
///     .with_auto_create(true)
///     .with_cancel_token(cancel.clone());
///
/// assert!(options.auto_create);
/// cancel.cancel();
/// assert!(options.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    /// Mint unresolved add targets instead of failing.
    pub auto_create: bool,
    /// Checked between steps and before each mutation.
    pub cancel: CancellationToken,
}

impl ReconcileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options carrying the configured auto-create default.
    pub fn from_config(config: &ReconcilerConfig) -> Self {
        Self {
            auto_create: config.auto_create_users,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_auto_create(mut self, auto_create: bool) -> Self {
        self.auto_create = auto_create;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
