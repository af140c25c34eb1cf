//! Declarative membership reconciliation for Rust.
//!
//! Reconciles a desired set of principals and roles against the membership
//! a remote system actually holds, issuing the minimal add/update/remove
//! mutations to converge. One generic engine serves organization users, team
//! members, team external-group sync and role assignments.
//!
//! # Core Components
//!
//! - [`Reconciler`] - Runs a pass: diff, resolve, apply, report
//! - [`MembershipSet`] - Duplicate-free, ordered set of principals
//! - [`diff()`](diff::diff) - Pure set differ producing [`Change`]s
//! - [`IdentityResolver`] - Identity key to remote id lookup, built once per pass
//! - [`remote`] - Collaborator traits the API client implements, plus
//!   [`InMemoryRemote`]
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use membership_reconciler::principal::{IdentityKey, Principal, Role};
//! use membership_reconciler::remote::InMemoryRemote;
//! use membership_reconciler::scope::ReconciliationScope;
//! use membership_reconciler::{ReconcileOptions, Reconciler};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let reconciler = Reconciler::new(InMemoryRemote::new());
//! let scope = ReconciliationScope::Organization { org_id: 1 };
//!
//! let recorded = vec![Principal::with_role(IdentityKey::new("alice@example.com")?, Role::Editor)];
//! let desired = vec![Principal::with_role(IdentityKey::new("alice@example.com")?, Role::Admin)];
//!
//! let report = reconciler
//!     .reconcile(&scope, recorded, desired, &ReconcileOptions::new())
//!     .await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//!
//! The crate logs through the `log` facade and never installs a logger.
//! Pass summaries are `info`, individual mutations `debug`, skipped stale
//! removals `warn`, directory paging `trace`.

pub mod applier;
pub mod config;
pub mod diff;
pub mod error;
pub mod identity;
pub mod membership;
pub mod principal;
pub mod reconciler;
pub mod remote;
pub mod retry;
pub mod scope;

// Re-export commonly used types for convenience
pub use applier::{ApplyOutcome, ChangeApplier};
pub use config::{ConfigError, ReconcilerConfig};
pub use diff::{Change, ChangeKind, ChangeSummary, RoleTracking};
pub use error::{ReconcileError, ReconcileResult, SetKind};
pub use identity::{Credential, IdentityResolver, Resolution, ResolutionStrategy};
pub use membership::MembershipSet;
pub use principal::{IdentityKey, Principal, RemoteId, Role};
pub use reconciler::{ReconcileOptions, ReconcileReport, Reconciler};
pub use remote::{
    IdentityDirectory, InMemoryRemote, MembershipMutator, MembershipReader, RemoteError,
};
pub use retry::{RetryPolicy, retry_transient};
pub use scope::{PrincipalKind, ReconciliationScope, ScopeClass, ScopeLocks};
