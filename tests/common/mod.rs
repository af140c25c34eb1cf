//! Common test utilities for reconciliation testing.
//!
//! This module provides fixtures, builders and assertion helpers shared by
//! the integration and property suites.

use membership_reconciler::remote::{InMemoryRemote, RemoteCall};
use membership_reconciler::{Change, ReconcileReport};

pub mod fixtures;

/// Install a test logger once; later calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
        .is_test(true)
        .try_init();
}

/// Render changes the way the differ displays them.
pub fn rendered(changes: &[Change]) -> Vec<String> {
    changes.iter().map(|change| change.to_string()).collect()
}

/// Mutation calls the remote received, rendered compactly.
pub async fn mutation_log(remote: &InMemoryRemote) -> Vec<String> {
    remote
        .mutation_calls()
        .await
        .into_iter()
        .map(|call| match call {
            RemoteCall::Add { key, .. } => format!("add {}", key),
            RemoteCall::Update {
                remote_id, role, ..
            } => format!("update {} {}", remote_id, role),
            RemoteCall::Remove { remote_id, .. } => format!("remove {}", remote_id),
            other => format!("{:?}", other),
        })
        .collect()
}

/// Assert a report applied exactly the given changes, in order.
pub fn assert_applied(report: &ReconcileReport, expected: &[&str]) {
    assert_eq!(
        rendered(&report.applied),
        expected.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        "applied changes differ for pass {}",
        report.pass_id
    );
}
