//! Property-based tests for diffing and full passes.
//!
//! Membership sets are generated over a small pool of identities so that
//! recorded and desired states overlap often.

use crate::common::init_logging;
use membership_reconciler::diff::diff;
use membership_reconciler::remote::InMemoryRemote;
use membership_reconciler::scope::ReconciliationScope;
use membership_reconciler::{
    Change, ChangeKind, IdentityKey, MembershipSet, Principal, ReconcileOptions, Reconciler,
    Role, RoleTracking, SetKind,
};
use proptest::prelude::*;
use std::collections::BTreeMap;

const POOL: usize = 8;

fn email(index: usize) -> String {
    format!("user{}@example.com", index)
}

fn role_strategy() -> impl Strategy<Value = Role> {
    prop::sample::select(Role::BUILTIN.to_vec())
}

/// A membership state: pool index to role.
fn state_strategy() -> impl Strategy<Value = BTreeMap<usize, Role>> {
    prop::collection::btree_map(0..POOL, role_strategy(), 0..POOL)
}

fn principals(state: &BTreeMap<usize, Role>) -> Vec<Principal> {
    state
        .iter()
        .map(|(index, role)| {
            Principal::with_role(IdentityKey::new(email(*index)).unwrap(), role.clone())
        })
        .collect()
}

fn set(kind: SetKind, state: &BTreeMap<usize, Role>) -> MembershipSet {
    MembershipSet::from_principals(kind, principals(state)).unwrap()
}

/// Apply a change list to a plain key-to-role model.
fn apply_to_model(model: &mut BTreeMap<String, Option<Role>>, changes: &[Change]) {
    for change in changes {
        let key = change.identity_key().as_str().to_string();
        match change {
            Change::Add(p) | Change::Update(p) => {
                model.insert(key, p.role().cloned());
            }
            Change::Remove(_) => {
                model.remove(&key);
            }
        }
    }
}

fn model_of(set: &MembershipSet) -> BTreeMap<String, Option<Role>> {
    set.iter()
        .map(|p| (p.identity_key().as_str().to_string(), p.role().cloned()))
        .collect()
}

proptest! {
    #[test]
    fn prop_applying_diff_converges(
        recorded in state_strategy(),
        desired in state_strategy(),
    ) {
        let recorded = set(SetKind::Recorded, &recorded);
        let desired = set(SetKind::Desired, &desired);

        let changes = diff(&recorded, &desired, RoleTracking::Tracked);
        let mut model = model_of(&recorded);
        apply_to_model(&mut model, &changes);

        prop_assert_eq!(model, model_of(&desired));
    }

    #[test]
    fn prop_diff_of_identical_sets_is_empty(state in state_strategy()) {
        let recorded = set(SetKind::Recorded, &state);
        let desired = set(SetKind::Desired, &state);

        prop_assert!(diff(&recorded, &desired, RoleTracking::Tracked).is_empty());
        prop_assert!(diff(&recorded, &desired, RoleTracking::Ignored).is_empty());
    }

    #[test]
    fn prop_no_redundant_changes(
        recorded in state_strategy(),
        desired in state_strategy(),
    ) {
        let recorded = set(SetKind::Recorded, &recorded);
        let desired = set(SetKind::Desired, &desired);

        for change in diff(&recorded, &desired, RoleTracking::Tracked) {
            let key = change.identity_key().as_str();
            match change.kind() {
                ChangeKind::Add => prop_assert!(!recorded.contains(key)),
                ChangeKind::Remove => prop_assert!(!desired.contains(key)),
                ChangeKind::Update => {
                    let current = recorded.get(key).and_then(Principal::role);
                    prop_assert_ne!(current, change.principal().role());
                }
            }
        }
    }

    #[test]
    fn prop_diff_order_is_deterministic(
        recorded in state_strategy(),
        desired in state_strategy(),
    ) {
        let recorded = set(SetKind::Recorded, &recorded);
        let desired = set(SetKind::Desired, &desired);
        let changes = diff(&recorded, &desired, RoleTracking::Tracked);

        // Adds and updates come first, then removes, each in ascending key order.
        let split = changes
            .iter()
            .position(|c| c.kind() == ChangeKind::Remove)
            .unwrap_or(changes.len());
        let (upserts, removes) = changes.split_at(split);
        prop_assert!(removes.iter().all(|c| c.kind() == ChangeKind::Remove));
        for window in upserts.windows(2) {
            prop_assert!(window[0].identity_key() < window[1].identity_key());
        }
        for window in removes.windows(2) {
            prop_assert!(window[0].identity_key() < window[1].identity_key());
        }

        prop_assert_eq!(changes, diff(&recorded, &desired, RoleTracking::Tracked));
    }

    #[test]
    fn prop_ignored_roles_never_update(
        recorded in state_strategy(),
        desired in state_strategy(),
    ) {
        let recorded = set(SetKind::Recorded, &recorded);
        let desired = set(SetKind::Desired, &desired);

        prop_assert!(
            diff(&recorded, &desired, RoleTracking::Ignored)
                .iter()
                .all(|c| c.kind() != ChangeKind::Update)
        );
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// A second pass from the observed state changes nothing.
    #[test]
    fn prop_full_pass_is_idempotent(
        initial in state_strategy(),
        desired in state_strategy(),
    ) {
        init_logging();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let scope = ReconciliationScope::Organization { org_id: 1 };
            let remote = InMemoryRemote::new();
            for index in 0..POOL {
                let id = remote.add_user(&email(index), &format!("user{}", index)).await;
                if let Some(role) = initial.get(&index) {
                    remote.seed_member(&scope, &id, Some(role.clone())).await;
                }
            }
            let reconciler = Reconciler::new(remote.clone());
            let options = ReconcileOptions::new();

            reconciler
                .reconcile(&scope, principals(&initial), principals(&desired), &options)
                .await
                .unwrap();

            let observed = reconciler.observe(&scope).await.unwrap();
            assert_eq!(model_of(&observed), model_of(&set(SetKind::Desired, &desired)));

            remote.clear_calls().await;
            let second = reconciler
                .reconcile(&scope, observed.iter().cloned(), principals(&desired), &options)
                .await
                .unwrap();
            assert!(second.is_noop());
            assert!(remote.mutation_calls().await.is_empty());
        });
    }
}
