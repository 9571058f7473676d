//! Student role reconciliation
//!
//! Moves a student's role assignments within a society from their current
//! state to a desired state with the smallest add/remove diff, while keeping
//! the society's baseline role attached.
//!
//! # Workflow
//! 1. Confirm membership
//! 2. Fetch baseline role, current assignments and society roles concurrently
//! 3. Inject the baseline role into the desired set
//! 4. Reject desired roles that do not belong to the society
//! 5. Compute the diff (the baseline is never removed)
//! 6. Short-circuit when nothing changes
//! 7. Apply the diff atomically
//! 8. Publish notifications and an activity entry without waiting
//! 9. Return the resulting role list and a summary

use crate::config::ConcurrencyMode;
use crate::effects::{ActivityEntry, ChangeKind, RoleChangeNotice, SideEffectDispatcher};
use crate::error::RosterError;
use crate::membership::MembershipValidator;
use crate::store::{AssignmentStore, RoleStore};
use crate::types::{
    ReconcileOutcome, ReconcileRequest, Role, RoleDiff, RoleId, SocietyId, StudentId,
    NO_CHANGES_MESSAGE,
};
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-(student, society) async locks
///
/// Entries are created on demand and removed once nobody holds or waits on
/// them.
#[derive(Debug, Default)]
pub struct SubjectLocks {
    table: DashMap<(StudentId, SocietyId), Arc<Mutex<()>>>,
}

impl SubjectLocks {
    /// Create empty lock table
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to one subject
    pub async fn acquire(&self, student: StudentId, society: SocietyId) -> SubjectGuard<'_> {
        let key = (student, society);
        let mutex = Arc::clone(self.table.entry(key).or_default().value());
        let guard = mutex.lock_owned().await;
        SubjectGuard {
            locks: self,
            key,
            guard: Some(guard),
        }
    }

    /// Number of subjects currently tracked
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Check if no subject is tracked
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Exclusive access to one subject, released on drop
#[derive(Debug)]
pub struct SubjectGuard<'a> {
    locks: &'a SubjectLocks,
    key: (StudentId, SocietyId),
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SubjectGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the table's own reference left: nobody holds or waits.
        self.locks
            .table
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// Computes and applies role diffs for one student at a time
pub struct RoleReconciler {
    roles: Arc<dyn RoleStore>,
    assignments: Arc<dyn AssignmentStore>,
    membership: MembershipValidator,
    effects: Arc<SideEffectDispatcher>,
    locks: SubjectLocks,
    mode: ConcurrencyMode,
}

impl RoleReconciler {
    /// Create reconciler
    #[must_use]
    pub fn new(
        roles: Arc<dyn RoleStore>,
        assignments: Arc<dyn AssignmentStore>,
        membership: MembershipValidator,
        effects: Arc<SideEffectDispatcher>,
        mode: ConcurrencyMode,
    ) -> Self {
        Self {
            roles,
            assignments,
            membership,
            effects,
            locks: SubjectLocks::new(),
            mode,
        }
    }

    /// Reconcile a student's roles in a society to the requested set
    ///
    /// # Errors
    /// - `RosterError::Membership` if the student is not a member
    /// - `RosterError::InvalidRole` if a requested role belongs elsewhere
    /// - `RosterError::Persistence` if a read or the atomic apply fails
    pub async fn reconcile(&self, request: ReconcileRequest) -> Result<ReconcileOutcome, RosterError> {
        let ReconcileRequest {
            actor,
            student,
            society,
            role_ids,
        } = request;

        self.membership.ensure_member(student, society).await?;

        let _subject = match self.mode {
            ConcurrencyMode::SerializePerSubject => Some(self.locks.acquire(student, society).await),
            ConcurrencyMode::LastWriteWins => None,
        };

        let (baseline, current, society_roles) = tokio::try_join!(
            self.roles.find_baseline_role(society),
            self.assignments.find_current_roles(student, society),
            self.roles.find_roles_by_society(society),
        )?;
        let baseline_id = baseline.map(|r| r.id);
        let roles_by_id: BTreeMap<RoleId, Role> =
            society_roles.into_iter().map(|r| (r.id, r)).collect();

        let explicit_empty = matches!(&role_ids, Some(ids) if ids.is_empty());
        let mut desired: BTreeSet<RoleId> = role_ids.unwrap_or_default().into_iter().collect();
        if let Some(id) = baseline_id {
            desired.insert(id);
        }

        let foreign: Vec<RoleId> = desired
            .iter()
            .filter(|id| Some(**id) != baseline_id && !roles_by_id.contains_key(*id))
            .copied()
            .collect();
        if !foreign.is_empty() {
            return Err(RosterError::InvalidRole {
                society,
                role_ids: foreign,
            });
        }

        let diff = RoleDiff::compute(&current, &desired, baseline_id);
        tracing::debug!(
            student = %student,
            society = %society,
            to_add = diff.to_add.len(),
            to_remove = diff.to_remove.len(),
            "Computed role diff"
        );

        if diff.is_empty() && !explicit_empty {
            return Ok(ReconcileOutcome {
                applied_roles: resolve_roles(&current, &roles_by_id),
                added: BTreeSet::new(),
                removed: BTreeSet::new(),
                message: NO_CHANGES_MESSAGE.to_string(),
            });
        }

        self.assignments.apply_diff(student, society, &diff).await?;

        let after = diff.apply_to(&current);
        let message = diff.summary();
        tracing::info!(student = %student, society = %society, "{}", message);

        self.publish_effects(actor, student, society, &diff, &roles_by_id);

        Ok(ReconcileOutcome {
            applied_roles: resolve_roles(&after, &roles_by_id),
            added: diff.to_add,
            removed: diff.to_remove,
            message,
        })
    }

    /// Number of subjects with a reconciliation in flight
    #[inline]
    #[must_use]
    pub fn subjects_in_flight(&self) -> usize {
        self.locks.len()
    }

    fn publish_effects(
        &self,
        actor: StudentId,
        student: StudentId,
        society: SocietyId,
        diff: &RoleDiff,
        roles_by_id: &BTreeMap<RoleId, Role>,
    ) {
        if diff.is_empty() {
            return;
        }

        let changes = diff
            .to_add
            .iter()
            .map(|id| (*id, ChangeKind::Added))
            .chain(diff.to_remove.iter().map(|id| (*id, ChangeKind::Removed)));
        for (role_id, kind) in changes {
            self.effects.notify(RoleChangeNotice {
                role_id,
                society_id: society,
                member_ids: BTreeSet::from([student]),
                kind,
            });
        }

        let mut description = diff.summary();
        if !diff.to_add.is_empty() {
            description.push_str(&format!("; added: {}", role_names(&diff.to_add, roles_by_id)));
        }
        if !diff.to_remove.is_empty() {
            description.push_str(&format!("; removed: {}", role_names(&diff.to_remove, roles_by_id)));
        }
        self.effects
            .record(ActivityEntry::for_student(actor, society, student, description));
    }
}

impl std::fmt::Debug for RoleReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleReconciler")
            .field("mode", &self.mode)
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}

fn resolve_roles(ids: &BTreeSet<RoleId>, roles_by_id: &BTreeMap<RoleId, Role>) -> Vec<Role> {
    let mut roles: Vec<Role> = ids.iter().filter_map(|id| roles_by_id.get(id).cloned()).collect();
    roles.sort_by_key(|r| (!r.is_baseline, r.name_key()));
    roles
}

fn role_names(ids: &BTreeSet<RoleId>, roles_by_id: &BTreeMap<RoleId, Role>) -> String {
    ids.iter()
        .map(|id| {
            roles_by_id
                .get(id)
                .map_or_else(|| id.to_string(), |r| r.name.clone())
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{LogActivityRecorder, LogNotifier};
    use crate::error::StoreError;
    use crate::store::{MockAssignmentStore, MockMembershipStore, MockRoleStore};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    struct Fixture {
        society: SocietyId,
        student: StudentId,
        member: Role,
        treasurer: Role,
        secretary: Role,
    }

    impl Fixture {
        fn new() -> Self {
            let society = SocietyId::new();
            Self {
                society,
                student: StudentId::new(),
                member: Role::baseline(society, "Member"),
                treasurer: Role::new(society, "Treasurer"),
                secretary: Role::new(society, "Secretary"),
            }
        }

        fn role_store(&self) -> MockRoleStore {
            let baseline = self.member.clone();
            let all = vec![self.member.clone(), self.treasurer.clone(), self.secretary.clone()];
            let mut roles = MockRoleStore::new();
            roles
                .expect_find_baseline_role()
                .returning(move |_| Ok(Some(baseline.clone())));
            roles
                .expect_find_roles_by_society()
                .returning(move |_| Ok(all.clone()));
            roles
        }

        fn reconciler(&self, assignments: MockAssignmentStore) -> RoleReconciler {
            let mut memberships = MockMembershipStore::new();
            memberships.expect_is_member().returning(|_, _| Ok(true));
            let effects = Arc::new(SideEffectDispatcher::spawn(
                Arc::new(LogNotifier),
                Arc::new(LogActivityRecorder),
                16,
                Duration::from_secs(1),
            ));
            RoleReconciler::new(
                Arc::new(self.role_store()),
                Arc::new(assignments),
                MembershipValidator::new(Arc::new(memberships)),
                effects,
                ConcurrencyMode::SerializePerSubject,
            )
        }
    }

    #[tokio::test]
    async fn swaps_roles_and_keeps_baseline() {
        let fx = Fixture::new();
        let current = BTreeSet::from([fx.member.id, fx.treasurer.id]);
        let expected = RoleDiff {
            to_add: BTreeSet::from([fx.secretary.id]),
            to_remove: BTreeSet::from([fx.treasurer.id]),
        };

        let mut assignments = MockAssignmentStore::new();
        assignments
            .expect_find_current_roles()
            .returning(move |_, _| Ok(current.clone()));
        assignments
            .expect_apply_diff()
            .withf(move |_, _, diff| *diff == expected)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let reconciler = fx.reconciler(assignments);
        let outcome = reconciler
            .reconcile(ReconcileRequest::new(
                fx.student,
                fx.student,
                fx.society,
                vec![fx.secretary.id],
            ))
            .await
            .unwrap();

        let names: Vec<&str> = outcome.applied_roles.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Member", "Secretary"]);
        assert_eq!(outcome.message, "1 role added, 1 role removed");
        assert_eq!(reconciler.subjects_in_flight(), 0);
    }

    #[tokio::test]
    async fn unchanged_set_short_circuits() {
        let fx = Fixture::new();
        let current = BTreeSet::from([fx.member.id, fx.treasurer.id]);

        let mut assignments = MockAssignmentStore::new();
        assignments
            .expect_find_current_roles()
            .returning(move |_, _| Ok(current.clone()));
        assignments.expect_apply_diff().never();

        let outcome = fx
            .reconciler(assignments)
            .reconcile(ReconcileRequest::new(
                fx.student,
                fx.student,
                fx.society,
                vec![fx.treasurer.id],
            ))
            .await
            .unwrap();

        assert_eq!(outcome.message, NO_CHANGES_MESSAGE);
        assert!(outcome.added.is_empty() && outcome.removed.is_empty());
    }

    #[tokio::test]
    async fn explicit_empty_list_always_applies() {
        let fx = Fixture::new();
        let current = BTreeSet::from([fx.member.id]);

        let mut assignments = MockAssignmentStore::new();
        assignments
            .expect_find_current_roles()
            .returning(move |_, _| Ok(current.clone()));
        assignments
            .expect_apply_diff()
            .withf(|_, _, diff| diff.is_empty())
            .times(1)
            .returning(|_, _, _| Ok(()));

        let outcome = fx
            .reconciler(assignments)
            .reconcile(ReconcileRequest::new(fx.student, fx.student, fx.society, vec![]))
            .await
            .unwrap();

        assert_eq!(outcome.message, NO_CHANGES_MESSAGE);
        assert_eq!(outcome.applied_roles, vec![fx.member.clone()]);
    }

    #[tokio::test]
    async fn missing_role_list_with_empty_diff_skips_apply() {
        let fx = Fixture::new();
        let current = BTreeSet::from([fx.member.id]);

        let mut assignments = MockAssignmentStore::new();
        assignments
            .expect_find_current_roles()
            .returning(move |_, _| Ok(current.clone()));
        assignments.expect_apply_diff().never();

        let outcome = fx
            .reconciler(assignments)
            .reconcile(ReconcileRequest::unspecified(fx.student, fx.student, fx.society))
            .await
            .unwrap();

        assert_eq!(outcome.message, NO_CHANGES_MESSAGE);
    }

    #[tokio::test]
    async fn foreign_role_rejected_before_any_write() {
        let fx = Fixture::new();
        let foreign = Role::new(SocietyId::new(), "Treasurer");

        let mut assignments = MockAssignmentStore::new();
        assignments
            .expect_find_current_roles()
            .returning(|_, _| Ok(BTreeSet::new()));
        assignments.expect_apply_diff().never();

        let result = fx
            .reconciler(assignments)
            .reconcile(ReconcileRequest::new(
                fx.student,
                fx.student,
                fx.society,
                vec![fx.treasurer.id, foreign.id],
            ))
            .await;

        match result {
            Err(RosterError::InvalidRole { role_ids, .. }) => assert_eq!(role_ids, vec![foreign.id]),
            other => panic!("expected InvalidRole, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_member_is_rejected() {
        let fx = Fixture::new();
        let mut memberships = MockMembershipStore::new();
        memberships.expect_is_member().returning(|_, _| Ok(false));
        let mut assignments = MockAssignmentStore::new();
        assignments.expect_find_current_roles().never();
        assignments.expect_apply_diff().never();

        let reconciler = RoleReconciler::new(
            Arc::new(MockRoleStore::new()),
            Arc::new(assignments),
            MembershipValidator::new(Arc::new(memberships)),
            Arc::new(SideEffectDispatcher::spawn(
                Arc::new(LogNotifier),
                Arc::new(LogActivityRecorder),
                4,
                Duration::from_secs(1),
            )),
            ConcurrencyMode::LastWriteWins,
        );

        let result = reconciler
            .reconcile(ReconcileRequest::new(fx.student, fx.student, fx.society, vec![]))
            .await;

        assert!(matches!(result, Err(RosterError::Membership { .. })));
    }

    #[tokio::test]
    async fn apply_failure_is_persistence_error() {
        let fx = Fixture::new();

        let mut assignments = MockAssignmentStore::new();
        assignments
            .expect_find_current_roles()
            .returning(|_, _| Ok(BTreeSet::new()));
        assignments
            .expect_apply_diff()
            .returning(|_, _, _| Err(StoreError::Unavailable("connection reset".to_string())));

        let result = fx
            .reconciler(assignments)
            .reconcile(ReconcileRequest::new(
                fx.student,
                fx.student,
                fx.society,
                vec![fx.treasurer.id],
            ))
            .await;

        let err = result.unwrap_err();
        assert!(!err.is_input_error());
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn subject_locks_are_released() {
        let locks = SubjectLocks::new();
        let (student, society) = (StudentId::new(), SocietyId::new());

        {
            let _guard = locks.acquire(student, society).await;
            assert_eq!(locks.len(), 1);
        }

        assert!(locks.is_empty());
    }
}
