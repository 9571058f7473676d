//! Student role reconciliation against the in-memory store

use pretty_assertions::assert_eq;
use roster_core::{
    AssignmentStore, EngineConfig, ReconcileRequest, RoleDiff, RoleId, RosterError, RosterStores,
    NO_CHANGES_MESSAGE,
};
use roster_store::InMemoryStore;
use roster_test_utils::{seed_society, setup_seeded, setup_test_engine, FlakyStore};
use std::collections::BTreeSet;
use std::sync::Arc;

fn ids(roles: &[roster_core::Role]) -> BTreeSet<RoleId> {
    roles.iter().map(|r| r.id).collect()
}

#[tokio::test]
async fn assigning_an_officer_role_keeps_the_baseline() {
    let (store, seeded, test) = setup_seeded().await;
    let student = seeded.members[0];

    let outcome = test
        .engine
        .reconcile_student_roles(ReconcileRequest::new(
            seeded.president,
            student,
            seeded.society,
            vec![seeded.treasurer.id],
        ))
        .await
        .unwrap();

    assert_eq!(outcome.added, BTreeSet::from([seeded.treasurer.id]));
    assert!(outcome.removed.is_empty());
    assert_eq!(outcome.message, "1 role added, 0 roles removed");
    assert_eq!(outcome.applied_roles[0].id, seeded.baseline.id);
    assert_eq!(
        store.find_current_roles(student, seeded.society).await.unwrap(),
        BTreeSet::from([seeded.baseline.id, seeded.treasurer.id])
    );
}

#[tokio::test]
async fn swapping_roles_reports_exact_diff() {
    let (_store, seeded, test) = setup_seeded().await;
    let student = seeded.members[0];
    let request = |roles| ReconcileRequest::new(seeded.president, student, seeded.society, roles);

    test.engine
        .reconcile_student_roles(request(vec![seeded.treasurer.id]))
        .await
        .unwrap();
    let outcome = test
        .engine
        .reconcile_student_roles(request(vec![seeded.secretary.id]))
        .await
        .unwrap();

    assert_eq!(outcome.added, BTreeSet::from([seeded.secretary.id]));
    assert_eq!(outcome.removed, BTreeSet::from([seeded.treasurer.id]));
    assert_eq!(
        ids(&outcome.applied_roles),
        BTreeSet::from([seeded.baseline.id, seeded.secretary.id])
    );
}

#[tokio::test]
async fn reconciling_back_restores_the_original_assignments() {
    let (store, seeded, test) = setup_seeded().await;
    let student = seeded.members[0];
    let request = |roles| ReconcileRequest::new(seeded.president, student, seeded.society, roles);
    test.engine
        .reconcile_student_roles(request(vec![seeded.treasurer.id]))
        .await
        .unwrap();
    let original = store.find_current_roles(student, seeded.society).await.unwrap();

    test.engine
        .reconcile_student_roles(request(vec![seeded.secretary.id]))
        .await
        .unwrap();
    let restored = test
        .engine
        .reconcile_student_roles(request(original.iter().copied().collect()))
        .await
        .unwrap();

    assert_eq!(restored.message, "1 role added, 1 role removed");
    assert_eq!(
        store.find_current_roles(student, seeded.society).await.unwrap(),
        original
    );
    assert_eq!(ids(&restored.applied_roles), original);
}

#[tokio::test]
async fn repeating_a_request_changes_nothing() {
    let (store, seeded, test) = setup_seeded().await;
    let student = seeded.members[1];
    let request = ReconcileRequest::new(
        seeded.president,
        student,
        seeded.society,
        vec![seeded.treasurer.id, seeded.secretary.id],
    );

    let first = test.engine.reconcile_student_roles(request.clone()).await.unwrap();
    let before = store.assignments_in(seeded.society);
    let second = test.engine.reconcile_student_roles(request).await.unwrap();

    assert_eq!(second.message, NO_CHANGES_MESSAGE);
    assert!(second.added.is_empty() && second.removed.is_empty());
    assert_eq!(ids(&second.applied_roles), ids(&first.applied_roles));
    assert_eq!(store.assignments_in(seeded.society), before);
}

#[tokio::test]
async fn explicit_empty_list_strips_everything_but_the_baseline() {
    let (store, seeded, test) = setup_seeded().await;
    let student = seeded.members[0];
    test.engine
        .reconcile_student_roles(ReconcileRequest::new(
            seeded.president,
            student,
            seeded.society,
            vec![seeded.treasurer.id, seeded.secretary.id],
        ))
        .await
        .unwrap();

    let outcome = test
        .engine
        .reconcile_student_roles(ReconcileRequest::new(
            seeded.president,
            student,
            seeded.society,
            vec![],
        ))
        .await
        .unwrap();

    assert_eq!(outcome.removed, BTreeSet::from([seeded.treasurer.id, seeded.secretary.id]));
    assert_eq!(outcome.message, "0 roles added, 2 roles removed");
    assert_eq!(
        store.find_current_roles(student, seeded.society).await.unwrap(),
        BTreeSet::from([seeded.baseline.id])
    );
}

#[tokio::test]
async fn missing_role_list_restores_a_lost_baseline() {
    let (store, seeded, test) = setup_seeded().await;
    let student = seeded.members[2];
    let strip = RoleDiff {
        to_add: BTreeSet::new(),
        to_remove: BTreeSet::from([seeded.baseline.id]),
    };
    store.apply_diff(student, seeded.society, &strip).await.unwrap();

    let outcome = test
        .engine
        .reconcile_student_roles(ReconcileRequest::unspecified(
            seeded.president,
            student,
            seeded.society,
        ))
        .await
        .unwrap();

    assert_eq!(outcome.added, BTreeSet::from([seeded.baseline.id]));
    assert_eq!(
        store.find_current_roles(student, seeded.society).await.unwrap(),
        BTreeSet::from([seeded.baseline.id])
    );
}

#[tokio::test]
async fn outcome_matches_what_a_fresh_read_returns() {
    let (store, seeded, test) = setup_seeded().await;
    let student = seeded.president;

    let outcome = test
        .engine
        .reconcile_student_roles(ReconcileRequest::new(
            seeded.president,
            student,
            seeded.society,
            vec![seeded.secretary.id, seeded.secretary.id],
        ))
        .await
        .unwrap();

    assert_eq!(
        ids(&outcome.applied_roles),
        store.find_current_roles(student, seeded.society).await.unwrap()
    );
}

#[tokio::test]
async fn non_members_are_rejected_without_writes() {
    let (store, seeded, test) = setup_seeded().await;
    let before = store.assignment_count();

    let err = test
        .engine
        .reconcile_student_roles(ReconcileRequest::new(
            seeded.president,
            seeded.outsider,
            seeded.society,
            vec![seeded.treasurer.id],
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, RosterError::Membership { .. }));
    assert!(err.is_input_error());
    assert_eq!(store.assignment_count(), before);
}

#[tokio::test]
async fn roles_of_another_society_are_invalid() {
    let (store, seeded, test) = setup_seeded().await;
    let other = seed_society(&store).await;
    let before = store.assignment_count();

    let err = test
        .engine
        .reconcile_student_roles(ReconcileRequest::new(
            seeded.president,
            seeded.members[0],
            seeded.society,
            vec![seeded.treasurer.id, other.treasurer.id],
        ))
        .await
        .unwrap_err();

    match err {
        RosterError::InvalidRole { society, role_ids } => {
            assert_eq!(society, seeded.society);
            assert_eq!(role_ids, vec![other.treasurer.id]);
        }
        other => panic!("expected InvalidRole, got {other:?}"),
    }
    assert_eq!(store.assignment_count(), before);
}

#[tokio::test]
async fn failed_apply_leaves_assignments_untouched() {
    let store = Arc::new(InMemoryStore::with_default_privileges());
    let seeded = seed_society(&store).await;
    let flaky = FlakyStore::new(Arc::clone(&store));
    let test = setup_test_engine(EngineConfig::new(), RosterStores::shared(Arc::clone(&flaky)));
    let before = store.assignments_in(seeded.society);

    flaky.arm();
    let err = test
        .engine
        .reconcile_student_roles(ReconcileRequest::new(
            seeded.president,
            seeded.members[0],
            seeded.society,
            vec![seeded.treasurer.id],
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, RosterError::Persistence(_)));
    assert!(err.is_retryable());
    assert_eq!(store.assignments_in(seeded.society), before);

    test.settle().await;
    assert!(test.recorder.entries().is_empty());
    assert!(test.notifier.notices().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_for_one_student_serialize() {
    let (store, seeded, test) = setup_seeded().await;
    let engine = Arc::new(test.engine);
    let student = seeded.members[0];

    let mut handles = Vec::new();
    for i in 0..16 {
        let engine = Arc::clone(&engine);
        let role = if i % 2 == 0 { seeded.treasurer.id } else { seeded.secretary.id };
        let request = ReconcileRequest::new(seeded.president, student, seeded.society, vec![role]);
        handles.push(tokio::spawn(async move {
            engine.reconcile_student_roles(request).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let current = store.find_current_roles(student, seeded.society).await.unwrap();
    assert_eq!(current.len(), 2);
    assert!(current.contains(&seeded.baseline.id));
    assert!(current.contains(&seeded.treasurer.id) ^ current.contains(&seeded.secretary.id));
}
