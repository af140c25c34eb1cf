//! Partial failure, convergence on re-run, cancellation and locking.

use crate::common::builders::{MembersBuilder, nobody};
use crate::common::fixtures::{org_scope, remote_with_users, role_scope, seed_user};
use crate::common::{init_logging, rendered};
use membership_reconciler::remote::{InMemoryRemote, RemoteError};
use membership_reconciler::scope::PrincipalKind;
use membership_reconciler::{
    ReconcileError, ReconcileOptions, Reconciler, ReconcilerConfig, RetryPolicy, Role, ScopeLocks,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_partial_failure_then_rerun_converges() {
    init_logging();
    let remote = remote_with_users().await;
    let reconciler = Reconciler::new(remote.clone());
    remote
        .fail_nth_mutation(1, RemoteError::status(500, "internal error"))
        .await;

    let desired = MembersBuilder::new()
        .with("alice@example.com", Role::Admin)
        .with("bob@example.com", Role::Editor)
        .with("carol@example.com", Role::Viewer)
        .build();

    let error = reconciler
        .reconcile(&org_scope(), nobody(), desired.clone(), &ReconcileOptions::new())
        .await
        .unwrap_err();

    assert!(error.is_transient());
    assert_eq!(
        rendered(error.applied_changes()),
        vec!["add alice@example.com (Admin)"]
    );
    assert_eq!(remote.members(&org_scope()).await.len(), 1);

    // The caller re-reads the remote and runs again from there.
    let observed = reconciler.observe(&org_scope()).await.unwrap();
    let report = reconciler
        .reconcile(
            &org_scope(),
            observed.iter().cloned(),
            desired,
            &ReconcileOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        rendered(&report.applied),
        vec!["add bob@example.com (Editor)", "add carol@example.com (Viewer)"]
    );
    assert_eq!(remote.members(&org_scope()).await.len(), 3);
}

#[tokio::test]
async fn test_rerun_from_stale_recorded_state_is_safe() {
    let remote = remote_with_users().await;
    seed_user(&remote, &org_scope(), "alice@example.com", Some(Role::Viewer)).await;
    let reconciler = Reconciler::new(remote.clone());

    // Recorded state says nobody, but alice is already there.
    let report = reconciler
        .reconcile(
            &org_scope(),
            nobody(),
            MembersBuilder::new()
                .with("alice@example.com", Role::Viewer)
                .build(),
            &ReconcileOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.already_present, 1);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let remote = remote_with_users().await;
    remote
        .fail_next_mutation(RemoteError::status(403, "permission denied"))
        .await;
    let reconciler = Reconciler::new(remote.clone());

    let result = reconciler
        .reconcile_with_retry(
            &org_scope(),
            nobody(),
            MembersBuilder::new()
                .with("alice@example.com", Role::Viewer)
                .build(),
            &ReconcileOptions::new(),
        )
        .await;

    match result {
        Err(ReconcileError::MutationFailed { source, .. }) => {
            assert_eq!(source.status_code(), Some(403));
        }
        other => panic!("expected MutationFailed, got {:?}", other),
    }
    assert_eq!(remote.mutation_calls().await.len(), 1);
}

#[tokio::test]
async fn test_retry_respects_configured_status_codes() {
    let remote = remote_with_users().await;
    remote
        .fail_next_mutation(RemoteError::status(409, "locked"))
        .await;
    let config = ReconcilerConfig::builder()
        .retry(RetryPolicy {
            retry_status_codes: vec!["423".to_string()],
            ..RetryPolicy::default()
        })
        .build()
        .unwrap();
    let reconciler = Reconciler::with_config(remote.clone(), config);

    // A conflict on add is tolerated outright, so nothing is retried.
    let report = reconciler
        .reconcile_with_retry(
            &org_scope(),
            nobody(),
            MembersBuilder::new()
                .with("alice@example.com", Role::Viewer)
                .build(),
            &ReconcileOptions::new(),
        )
        .await
        .unwrap();
    assert_eq!(report.already_present, 1);
}

#[tokio::test]
async fn test_cancelled_pass_issues_no_mutation() {
    let remote = remote_with_users().await;
    let reconciler = Reconciler::new(remote.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = reconciler
        .reconcile(
            &org_scope(),
            nobody(),
            MembersBuilder::new()
                .with("alice@example.com", Role::Viewer)
                .build(),
            &ReconcileOptions::new().with_cancel_token(cancel),
        )
        .await;

    match result {
        Err(ReconcileError::Cancelled { applied }) => assert!(applied.is_empty()),
        other => panic!("expected Cancelled, got {:?}", other),
    }
    assert!(remote.mutation_calls().await.is_empty());
}

#[tokio::test]
async fn test_concurrent_role_assignments_serialize() {
    init_logging();
    let remote = InMemoryRemote::new();
    for i in 0..20 {
        remote
            .add_user(&format!("user{}@example.com", i), &format!("user{}", i))
            .await;
    }
    let locks = Arc::new(ScopeLocks::new());
    let first = Reconciler::new(remote.clone()).with_locks(Arc::clone(&locks));
    let second = Reconciler::new(remote.clone()).with_locks(Arc::clone(&locks));

    let viewers = role_scope("viewers", PrincipalKind::User);
    let editors = role_scope("editors", PrincipalKind::User);
    let first_half: Vec<_> = (0..10)
        .fold(MembersBuilder::new(), |b, i| b.member(&format!("user{}", i)))
        .build();
    let second_half: Vec<_> = (10..20)
        .fold(MembersBuilder::new(), |b, i| b.member(&format!("user{}", i)))
        .build();
    let options = ReconcileOptions::new();

    let (a, b) = tokio::join!(
        first.reconcile_locked(&viewers, nobody(), first_half, &options),
        second.reconcile_locked(&editors, nobody(), second_half, &options),
    );

    assert_eq!(a.unwrap().applied.len(), 10);
    assert_eq!(b.unwrap().applied.len(), 10);
    assert_eq!(remote.members(&viewers).await.len(), 10);
    assert_eq!(remote.members(&editors).await.len(), 10);
}

#[tokio::test]
async fn test_concurrent_passes_on_different_teams() {
    let remote = remote_with_users().await;
    let reconciler = Arc::new(Reconciler::new(remote.clone()));

    let mut handles = Vec::new();
    for (team_id, key) in [(1, "alice"), (2, "bob"), (3, "carol")] {
        let reconciler = Arc::clone(&reconciler);
        handles.push(tokio::spawn(async move {
            let scope = crate::common::fixtures::team_scope(team_id);
            reconciler
                .reconcile_locked(
                    &scope,
                    nobody(),
                    MembersBuilder::new().member(key).build(),
                    &ReconcileOptions::new(),
                )
                .await
                .map(|report| report.applied.len())
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 1);
    }
}
