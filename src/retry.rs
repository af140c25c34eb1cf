//! Caller-side retry of whole reconciliation passes.
//!
//! The engine never retries on its own. [`retry_transient`] re-runs a pass
//! when it failed for a reason the [`RetryPolicy`] considers retryable. A
//! re-run is safe: the second pass re-diffs and the add-conflict and
//! remove-not-found tolerances absorb whatever the first pass already did.

use crate::config::ConfigError;
use crate::error::{ReconcileError, ReconcileResult};
use crate::remote::RemoteError;
use log::warn;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// When and how often a failed pass is re-run.
///
/// Status patterns are three characters of digits or `x`, where `x` matches
/// any digit: `"429"`, `"5xx"`, `"50x"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Re-runs after the first attempt.
    pub retries: u32,
    /// Seconds to wait between attempts.
    pub retry_wait: u64,
    pub retry_status_codes: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            retry_wait: 0,
            retry_status_codes: vec!["429".to_string(), "5xx".to_string()],
        }
    }
}

impl RetryPolicy {
    /// A policy that never re-runs.
    pub fn none() -> Self {
        Self {
            retries: 0,
            ..Self::default()
        }
    }

    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.retry_wait)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for pattern in &self.retry_status_codes {
            if !is_valid_pattern(pattern) {
                return Err(ConfigError::ValidationError {
                    message: format!(
                        "Retry status code '{}' must be three digits or 'x' wildcards",
                        pattern
                    ),
                });
            }
        }
        Ok(())
    }

    pub fn matches_status(&self, code: u16) -> bool {
        let code = code.to_string();
        self.retry_status_codes
            .iter()
            .any(|pattern| pattern_matches(pattern, &code))
    }

    /// Whether the remote failure behind an error warrants a re-run.
    pub fn is_retryable_remote(&self, error: &RemoteError) -> bool {
        match error {
            RemoteError::Transport { .. } | RemoteError::Timeout { .. } => true,
            other => other
                .status_code()
                .is_some_and(|code| self.matches_status(code)),
        }
    }

    /// Only listing and mutation failures are retried; configuration and
    /// resolution errors need user action.
    pub fn is_retryable(&self, error: &ReconcileError) -> bool {
        match error {
            ReconcileError::RemoteUnavailable { source, .. }
            | ReconcileError::MutationFailed { source, .. } => self.is_retryable_remote(source),
            _ => false,
        }
    }
}

fn is_valid_pattern(pattern: &str) -> bool {
    pattern.len() == 3 && pattern.chars().all(|c| c.is_ascii_digit() || c == 'x')
}

fn pattern_matches(pattern: &str, code: &str) -> bool {
    pattern.len() == code.len()
        && pattern
            .chars()
            .zip(code.chars())
            .all(|(p, c)| p == 'x' || p == c)
}

/// Run `pass`, re-running it while it fails retryably and attempts remain.
///
/// The wait between attempts races `cancel`; a cancellation during the wait
/// returns [`ReconcileError::Cancelled`] carrying the changes the failed
/// attempt had applied.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut pass: F,
) -> ReconcileResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ReconcileResult<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match pass().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < policy.retries && policy.is_retryable(&error) => {
                attempt += 1;
                warn!(
                    "Reconciliation attempt {} of {} failed: {}; retrying in {:?}",
                    attempt,
                    policy.retries + 1,
                    error,
                    policy.wait()
                );
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(ReconcileError::Cancelled {
                            applied: error.applied_changes().to_vec(),
                        });
                    }
                    _ = tokio::time::sleep(policy.wait()) => {}
                }
            }
            Err(error) => return Err(error),
        }
    }
}
