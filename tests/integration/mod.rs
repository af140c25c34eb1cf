//! Integration tests for the reconciliation engine.
//!
//! Every test drives a full pass through [`Reconciler`] against an
//! [`InMemoryRemote`] and then inspects the remote's membership and call
//! log.
//!
//! ## Test Organization
//!
//! - `scenarios` - The reference scenarios: add, update/remove, stale
//!   removal, duplicates, unresolvable adds
//! - `scopes` - Team, external-group and role-assignment scopes
//! - `recovery` - Partial failure, re-run convergence, cancellation and
//!   lock serialization
//!
//! [`Reconciler`]: membership_reconciler::Reconciler
//! [`InMemoryRemote`]: membership_reconciler::InMemoryRemote

pub mod recovery;
pub mod scenarios;
