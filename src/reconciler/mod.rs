//! Reconciliation orchestration.
//!
//! The [`Reconciler`] runs one pass per call: build the recorded and desired
//! sets, diff them, resolve identities, apply the changes, and report.
//!
//! # Module Organization
//!
//! * [`core`] - The Reconciler and its pass logic
//! * [`options`] - Per-pass options (auto-create, cancellation)
//! * [`report`] - The report a successful pass returns

pub mod core;
pub mod options;
pub mod report;


pub use self::core::Reconciler;
pub use options::ReconcileOptions;
pub use report::ReconcileReport;
