//! Reference scenarios for organization membership.

use crate::common::builders::{MembersBuilder, nobody};
use crate::common::fixtures::{org_scope, remote_with_users, seed_user};
use crate::common::{assert_applied, init_logging, mutation_log};
use membership_reconciler::remote::RemoteError;
use membership_reconciler::{
    ChangeKind, ReconcileError, ReconcileOptions, Reconciler, Role, SetKind,
};

#[tokio::test]
async fn test_add_new_member() {
    init_logging();
    let remote = remote_with_users().await;
    seed_user(&remote, &org_scope(), "alice@example.com", Some(Role::Editor)).await;
    let reconciler = Reconciler::new(remote.clone());

    let recorded = MembersBuilder::new()
        .with("alice@example.com", Role::Editor)
        .build();
    let desired = MembersBuilder::new()
        .with("alice@example.com", Role::Editor)
        .with("bob@example.com", Role::Viewer)
        .build();

    let report = reconciler
        .reconcile(&org_scope(), recorded, desired, &ReconcileOptions::new())
        .await
        .unwrap();

    assert_applied(&report, &["add bob@example.com (Viewer)"]);
    assert_eq!(mutation_log(&remote).await, vec!["add bob@example.com"]);
    assert_eq!(
        remote.members(&org_scope()).await,
        vec![
            ("alice@example.com".to_string(), Some(Role::Editor)),
            ("bob@example.com".to_string(), Some(Role::Viewer)),
        ]
    );
}

#[tokio::test]
async fn test_update_role_and_remove_member() {
    init_logging();
    let remote = remote_with_users().await;
    let alice = seed_user(&remote, &org_scope(), "alice@example.com", Some(Role::Editor)).await;
    let bob = seed_user(&remote, &org_scope(), "bob@example.com", Some(Role::Viewer)).await;
    let reconciler = Reconciler::new(remote.clone());

    let recorded = MembersBuilder::new()
        .with("alice@example.com", Role::Editor)
        .with("bob@example.com", Role::Viewer)
        .build();
    let desired = MembersBuilder::new()
        .with("alice@example.com", Role::Admin)
        .build();

    let report = reconciler
        .reconcile(&org_scope(), recorded, desired, &ReconcileOptions::new())
        .await
        .unwrap();

    assert_applied(
        &report,
        &["update alice@example.com (Admin)", "remove bob@example.com (Viewer)"],
    );
    assert_eq!(
        mutation_log(&remote).await,
        vec![format!("update {} Admin", alice), format!("remove {}", bob)]
    );
    assert_eq!(
        remote.members(&org_scope()).await,
        vec![("alice@example.com".to_string(), Some(Role::Admin))]
    );
}

#[tokio::test]
async fn test_identical_state_issues_no_mutation() {
    init_logging();
    let remote = remote_with_users().await;
    seed_user(&remote, &org_scope(), "alice@example.com", Some(Role::Editor)).await;
    let reconciler = Reconciler::new(remote.clone());
    let state = MembersBuilder::new()
        .with("alice@example.com", Role::Editor)
        .build();

    let report = reconciler
        .reconcile(&org_scope(), state.clone(), state, &ReconcileOptions::new())
        .await
        .unwrap();

    assert!(report.is_noop());
    assert!(remote.calls().await.is_empty());
}

#[tokio::test]
async fn test_stale_removal_is_tolerated() {
    init_logging();
    let remote = remote_with_users().await;
    let carol = seed_user(&remote, &org_scope(), "carol@example.com", Some(Role::Viewer)).await;
    remote.delete_identity(&carol).await;
    let reconciler = Reconciler::new(remote.clone());

    let recorded = MembersBuilder::new()
        .with("carol@example.com", Role::Viewer)
        .build();

    let report = reconciler
        .reconcile(&org_scope(), recorded, nobody(), &ReconcileOptions::new())
        .await
        .unwrap();

    assert!(report.applied.is_empty());
    assert_eq!(report.skipped.len(), 1);
    assert!(mutation_log(&remote).await.is_empty());
}

#[tokio::test]
async fn test_duplicate_identity_fails_before_any_call() {
    init_logging();
    let remote = remote_with_users().await;
    let reconciler = Reconciler::new(remote.clone());

    let desired = MembersBuilder::new()
        .with("alice@example.com", Role::Admin)
        .with("alice@example.com", Role::Viewer)
        .build();

    let result = reconciler
        .reconcile(&org_scope(), nobody(), desired, &ReconcileOptions::new())
        .await;

    match result {
        Err(ReconcileError::DuplicateIdentity { key, set }) => {
            assert_eq!(key, "alice@example.com");
            assert_eq!(set, SetKind::Desired);
        }
        other => panic!("expected DuplicateIdentity, got {:?}", other),
    }
    assert!(remote.calls().await.is_empty());
}

#[tokio::test]
async fn test_duplicate_in_recorded_set_is_reported() {
    let reconciler = Reconciler::new(remote_with_users().await);
    let recorded = MembersBuilder::new()
        .with("bob@example.com", Role::Viewer)
        .with("bob@example.com", Role::Viewer)
        .build();

    let result = reconciler
        .reconcile(&org_scope(), recorded, nobody(), &ReconcileOptions::new())
        .await;
    assert!(matches!(
        result,
        Err(ReconcileError::DuplicateIdentity {
            set: SetKind::Recorded,
            ..
        })
    ));
}

#[tokio::test]
async fn test_unresolvable_add_without_auto_create() {
    init_logging();
    let remote = remote_with_users().await;
    let reconciler = Reconciler::new(remote.clone());

    let desired = MembersBuilder::new()
        .with("bob@example.com", Role::Viewer)
        .with("dave@example.com", Role::Viewer)
        .build();

    let result = reconciler
        .reconcile(
            &org_scope(),
            nobody(),
            desired,
            &ReconcileOptions::new().with_auto_create(false),
        )
        .await;

    match result {
        Err(ReconcileError::IdentityNotFound { key, kind }) => {
            assert_eq!(key, "dave@example.com");
            assert_eq!(kind, ChangeKind::Add);
        }
        other => panic!("expected IdentityNotFound, got {:?}", other),
    }
    // Resolution precedes application, so nothing reached the remote.
    assert!(mutation_log(&remote).await.is_empty());
    assert!(remote.members(&org_scope()).await.is_empty());
}

#[tokio::test]
async fn test_unresolvable_add_with_auto_create() {
    init_logging();
    let remote = remote_with_users().await;
    let reconciler = Reconciler::new(remote.clone());

    let desired = MembersBuilder::new()
        .with("dave@example.com", Role::Editor)
        .build();

    let report = reconciler
        .reconcile(
            &org_scope(),
            nobody(),
            desired,
            &ReconcileOptions::new().with_auto_create(true),
        )
        .await
        .unwrap();

    assert_eq!(report.created.len(), 1);
    assert_eq!(report.created[0].identity_key().as_str(), "dave@example.com");
    assert_eq!(
        remote.members(&org_scope()).await,
        vec![("dave@example.com".to_string(), Some(Role::Editor))]
    );
}

#[tokio::test]
async fn test_add_by_login_and_read_back_by_email() {
    init_logging();
    let remote = remote_with_users().await;
    let reconciler = Reconciler::new(remote.clone());

    let desired = MembersBuilder::new().with("bob", Role::Viewer).build();
    reconciler
        .reconcile(&org_scope(), nobody(), desired, &ReconcileOptions::new())
        .await
        .unwrap();

    let observed = reconciler.observe(&org_scope()).await.unwrap();
    assert!(observed.contains("bob@example.com"));
}

#[tokio::test]
async fn test_login_key_survives_pass_from_observed_state() {
    init_logging();
    let remote = remote_with_users().await;
    let reconciler = Reconciler::new(remote.clone());
    let desired = MembersBuilder::new().with("bob", Role::Viewer).build();

    reconciler
        .reconcile(&org_scope(), nobody(), desired.clone(), &ReconcileOptions::new())
        .await
        .unwrap();

    // The remote reports bob by email; the next pass must not remove him.
    let observed = reconciler.observe(&org_scope()).await.unwrap();
    remote.clear_calls().await;
    let report = reconciler
        .reconcile(
            &org_scope(),
            observed.iter().cloned(),
            desired,
            &ReconcileOptions::new(),
        )
        .await
        .unwrap();

    assert!(report.applied.is_empty());
    assert!(mutation_log(&remote).await.is_empty());
    assert_eq!(
        remote.members(&org_scope()).await,
        vec![("bob@example.com".to_string(), Some(Role::Viewer))]
    );
}

#[tokio::test]
async fn test_login_key_role_change_from_observed_state_updates() {
    init_logging();
    let remote = remote_with_users().await;
    let bob = seed_user(&remote, &org_scope(), "bob@example.com", Some(Role::Viewer)).await;
    let reconciler = Reconciler::new(remote.clone());

    let observed = reconciler.observe(&org_scope()).await.unwrap();
    let report = reconciler
        .reconcile(
            &org_scope(),
            observed.iter().cloned(),
            MembersBuilder::new().with("bob", Role::Admin).build(),
            &ReconcileOptions::new(),
        )
        .await
        .unwrap();

    assert_applied(&report, &["update bob (Admin)"]);
    assert_eq!(mutation_log(&remote).await, vec![format!("update {} Admin", bob)]);
    assert_eq!(
        remote.members(&org_scope()).await,
        vec![("bob@example.com".to_string(), Some(Role::Admin))]
    );
}

#[tokio::test]
async fn test_login_and_email_of_one_user_are_rejected() {
    init_logging();
    let remote = remote_with_users().await;
    let reconciler = Reconciler::new(remote.clone());

    let desired = MembersBuilder::new()
        .with("bob", Role::Viewer)
        .with("bob@example.com", Role::Admin)
        .build();

    let result = reconciler
        .reconcile(&org_scope(), nobody(), desired, &ReconcileOptions::new())
        .await;

    match result {
        Err(ReconcileError::AliasedIdentity { key, alias, set }) => {
            assert_eq!(key, "bob");
            assert_eq!(alias, "bob@example.com");
            assert_eq!(set, SetKind::Desired);
        }
        other => panic!("expected AliasedIdentity, got {:?}", other),
    }
    assert!(mutation_log(&remote).await.is_empty());
    assert!(remote.members(&org_scope()).await.is_empty());
}

#[tokio::test]
async fn test_auto_create_refused_by_remote() {
    init_logging();
    let remote = remote_with_users().await;
    remote
        .fail_identity_creation(Some(RemoteError::status(403, "user creation disabled")))
        .await;
    let reconciler = Reconciler::new(remote.clone());

    let desired = MembersBuilder::new()
        .with("bob@example.com", Role::Viewer)
        .with("dave@example.com", Role::Editor)
        .build();

    let result = reconciler
        .reconcile(
            &org_scope(),
            nobody(),
            desired,
            &ReconcileOptions::new().with_auto_create(true),
        )
        .await;

    match result {
        Err(ReconcileError::IdentityCreateFailed { key, source }) => {
            assert_eq!(key, "dave@example.com");
            assert_eq!(source.status_code(), Some(403));
        }
        other => panic!("expected IdentityCreateFailed, got {:?}", other),
    }
    // Creation happens during resolution, before any membership call.
    assert!(mutation_log(&remote).await.is_empty());
}
