//! In-memory store
//!
//! All state sits behind one [`RwLock`]. Every mutating method validates its
//! whole input under the write lock before touching anything, so a failed
//! call leaves the state exactly as it was.

use crate::snapshot::{Snapshot, SnapshotError};
use async_trait::async_trait;
use parking_lot::RwLock;
use roster_core::{
    Assignment, AssignmentStore, Membership, MembershipStore, Privilege, PrivilegeStore, Role,
    RoleDiff, RoleId, RoleStore, SocietyId, StoreError, StudentId,
};
use std::collections::{BTreeMap, BTreeSet};

/// Privilege keys known to a freshly provisioned platform
pub const DEFAULT_PRIVILEGE_KEYS: &[&str] = &[
    "society_settings_management",
    "member_management",
    "role_management",
    "event_management",
    "event_ticket_handling",
    "announcement_management",
    "chat_moderation",
    "meeting_management",
    "team_management",
    "payment_handling",
];

#[derive(Debug, Default)]
struct State {
    /// Catalog by key
    privileges: BTreeMap<String, Privilege>,
    roles: BTreeMap<RoleId, Role>,
    memberships: BTreeSet<Membership>,
    assignments: BTreeSet<Assignment>,
}

impl State {
    fn is_member(&self, student_id: StudentId, society_id: SocietyId) -> bool {
        self.memberships.contains(&Membership {
            student_id,
            society_id,
        })
    }

    fn holders(&self, role_id: RoleId) -> BTreeSet<StudentId> {
        self.assignments
            .iter()
            .filter(|a| a.role_id == role_id)
            .map(|a| a.student_id)
            .collect()
    }

    /// Name, baseline and privilege checks for a role about to be written
    fn check_role(&self, role: &Role) -> Result<(), StoreError> {
        let key = role.name_key();
        for other in self.roles.values() {
            if other.id == role.id || other.society_id != role.society_id {
                continue;
            }
            if other.name_key() == key {
                return Err(StoreError::Conflict(format!(
                    "role name '{}' already used in society {}",
                    role.name, role.society_id
                )));
            }
            if role.is_baseline && other.is_baseline {
                return Err(StoreError::Conflict(format!(
                    "society {} already has a baseline role",
                    role.society_id
                )));
            }
        }

        if let Some(unknown) = role
            .privilege_keys
            .iter()
            .find(|k| !self.privileges.contains_key(*k))
        {
            return Err(StoreError::Constraint(format!("unknown privilege key '{unknown}'")));
        }
        Ok(())
    }

    fn check_members(&self, society: SocietyId, members: &BTreeSet<StudentId>) -> Result<(), StoreError> {
        match members.iter().find(|s| !self.is_member(**s, society)) {
            Some(outsider) => Err(StoreError::Constraint(format!(
                "student {outsider} is not a member of society {society}"
            ))),
            None => Ok(()),
        }
    }

    fn assign_all(&mut self, role: &Role, members: &BTreeSet<StudentId>) {
        self.assignments.extend(members.iter().map(|student_id| Assignment {
            student_id: *student_id,
            society_id: role.society_id,
            role_id: role.id,
        }));
    }
}

/// Transactional in-memory implementation of every store contract
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    /// Create empty store with no privileges
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create store seeded with [`DEFAULT_PRIVILEGE_KEYS`]
    #[must_use]
    pub fn with_default_privileges() -> Self {
        let store = Self::new();
        for key in DEFAULT_PRIVILEGE_KEYS {
            store.add_privilege(*key);
        }
        store
    }

    /// Add a privilege to the catalog; existing keys are kept
    pub fn add_privilege(&self, key: impl Into<String>) -> Privilege {
        let key = key.into();
        self.state
            .write()
            .privileges
            .entry(key.clone())
            .or_insert_with(|| Privilege::new(key))
            .clone()
    }

    /// Record an active membership
    pub fn add_membership(&self, student_id: StudentId, society_id: SocietyId) {
        self.state.write().memberships.insert(Membership {
            student_id,
            society_id,
        });
    }

    /// End a membership and drop the student's assignments in that society
    pub fn remove_membership(&self, student_id: StudentId, society_id: SocietyId) -> bool {
        let mut state = self.state.write();
        let removed = state.memberships.remove(&Membership {
            student_id,
            society_id,
        });
        if removed {
            state
                .assignments
                .retain(|a| !(a.student_id == student_id && a.society_id == society_id));
        }
        removed
    }

    /// Every assignment in a society
    #[must_use]
    pub fn assignments_in(&self, society: SocietyId) -> BTreeSet<Assignment> {
        self.state
            .read()
            .assignments
            .iter()
            .filter(|a| a.society_id == society)
            .copied()
            .collect()
    }

    /// Total number of assignments
    #[must_use]
    pub fn assignment_count(&self) -> usize {
        self.state.read().assignments.len()
    }

    /// Copy of the full state
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.read();
        Snapshot {
            privileges: state.privileges.values().cloned().collect(),
            roles: state.roles.values().cloned().collect(),
            memberships: state.memberships.iter().copied().collect(),
            assignments: state.assignments.iter().copied().collect(),
        }
    }

    /// Rebuild a store from a snapshot, checking every invariant
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, SnapshotError> {
        let mut state = State::default();

        for privilege in snapshot.privileges {
            if state.privileges.contains_key(&privilege.key) {
                return Err(SnapshotError::Inconsistent(format!(
                    "duplicate privilege key '{}'",
                    privilege.key
                )));
            }
            state.privileges.insert(privilege.key.clone(), privilege);
        }
        state.memberships.extend(snapshot.memberships);

        for role in snapshot.roles {
            if state.roles.contains_key(&role.id) {
                return Err(SnapshotError::Inconsistent(format!("duplicate role id {}", role.id)));
            }
            state
                .check_role(&role)
                .map_err(|e| SnapshotError::Inconsistent(e.to_string()))?;
            state.roles.insert(role.id, role);
        }

        for assignment in snapshot.assignments {
            match state.roles.get(&assignment.role_id) {
                Some(role) if role.society_id == assignment.society_id => {}
                _ => {
                    return Err(SnapshotError::Inconsistent(format!(
                        "assignment references role {} outside society {}",
                        assignment.role_id, assignment.society_id
                    )));
                }
            }
            if !state.is_member(assignment.student_id, assignment.society_id) {
                return Err(SnapshotError::Inconsistent(format!(
                    "assignment for non-member {} in society {}",
                    assignment.student_id, assignment.society_id
                )));
            }
            state.assignments.insert(assignment);
        }

        tracing::debug!(
            roles = state.roles.len(),
            assignments = state.assignments.len(),
            "Loaded store snapshot"
        );

        Ok(Self {
            state: RwLock::new(state),
        })
    }
}

#[async_trait]
impl AssignmentStore for InMemoryStore {
    async fn find_current_roles(
        &self,
        student: StudentId,
        society: SocietyId,
    ) -> Result<BTreeSet<RoleId>, StoreError> {
        Ok(self
            .state
            .read()
            .assignments
            .iter()
            .filter(|a| a.student_id == student && a.society_id == society)
            .map(|a| a.role_id)
            .collect())
    }

    async fn apply_diff(
        &self,
        student: StudentId,
        society: SocietyId,
        diff: &RoleDiff,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write();

        if !diff.to_add.is_empty() && !state.is_member(student, society) {
            return Err(StoreError::Constraint(format!(
                "student {student} is not a member of society {society}"
            )));
        }
        for role_id in &diff.to_add {
            match state.roles.get(role_id) {
                Some(role) if role.society_id == society => {}
                _ => {
                    return Err(StoreError::Constraint(format!(
                        "role {role_id} does not belong to society {society}"
                    )));
                }
            }
        }

        for role_id in &diff.to_remove {
            state.assignments.remove(&Assignment {
                student_id: student,
                society_id: society,
                role_id: *role_id,
            });
        }
        state.assignments.extend(diff.to_add.iter().map(|role_id| Assignment {
            student_id: student,
            society_id: society,
            role_id: *role_id,
        }));
        Ok(())
    }
}

#[async_trait]
impl RoleStore for InMemoryStore {
    async fn find_role(&self, role_id: RoleId) -> Result<Option<Role>, StoreError> {
        Ok(self.state.read().roles.get(&role_id).cloned())
    }

    async fn find_roles_by_society(&self, society: SocietyId) -> Result<Vec<Role>, StoreError> {
        Ok(self
            .state
            .read()
            .roles
            .values()
            .filter(|r| r.society_id == society)
            .cloned()
            .collect())
    }

    async fn find_baseline_role(&self, society: SocietyId) -> Result<Option<Role>, StoreError> {
        Ok(self
            .state
            .read()
            .roles
            .values()
            .find(|r| r.society_id == society && r.is_baseline)
            .cloned())
    }

    async fn find_role_members(&self, role_id: RoleId) -> Result<BTreeSet<StudentId>, StoreError> {
        Ok(self.state.read().holders(role_id))
    }

    async fn insert_role(&self, role: &Role, members: &BTreeSet<StudentId>) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if state.roles.contains_key(&role.id) {
            return Err(StoreError::Conflict(format!("role {} already exists", role.id)));
        }
        state.check_role(role)?;
        state.check_members(role.society_id, members)?;

        state.roles.insert(role.id, role.clone());
        state.assign_all(role, members);
        Ok(())
    }

    async fn replace_role(
        &self,
        role: &Role,
        members: Option<BTreeSet<StudentId>>,
    ) -> Result<BTreeSet<StudentId>, StoreError> {
        let mut state = self.state.write();
        match state.roles.get(&role.id) {
            Some(stored) if stored.society_id == role.society_id && stored.is_baseline == role.is_baseline => {}
            Some(_) => {
                return Err(StoreError::Constraint(format!(
                    "role {} cannot change society or baseline status",
                    role.id
                )));
            }
            None => return Err(StoreError::Constraint(format!("role {} does not exist", role.id))),
        }
        state.check_role(role)?;
        if let Some(members) = &members {
            state.check_members(role.society_id, members)?;
        }

        let previous = state.holders(role.id);
        state.roles.insert(role.id, role.clone());
        if let Some(members) = members {
            state.assignments.retain(|a| a.role_id != role.id);
            state.assign_all(role, &members);
        }
        Ok(previous)
    }

    async fn delete_role(&self, role_id: RoleId) -> Result<BTreeSet<StudentId>, StoreError> {
        let mut state = self.state.write();
        if !state.roles.contains_key(&role_id) {
            return Err(StoreError::Constraint(format!("role {role_id} does not exist")));
        }

        let holders = state.holders(role_id);
        state.assignments.retain(|a| a.role_id != role_id);
        state.roles.remove(&role_id);
        Ok(holders)
    }
}

#[async_trait]
impl MembershipStore for InMemoryStore {
    async fn is_member(&self, student: StudentId, society: SocietyId) -> Result<bool, StoreError> {
        Ok(self.state.read().is_member(student, society))
    }

    async fn find_members_of(
        &self,
        society: SocietyId,
        candidates: &BTreeSet<StudentId>,
    ) -> Result<BTreeSet<StudentId>, StoreError> {
        let state = self.state.read();
        Ok(candidates
            .iter()
            .filter(|s| state.is_member(**s, society))
            .copied()
            .collect())
    }
}

#[async_trait]
impl PrivilegeStore for InMemoryStore {
    async fn resolve(&self, keys: &[String]) -> Result<Vec<Privilege>, StoreError> {
        let state = self.state.read();
        Ok(keys
            .iter()
            .filter_map(|k| state.privileges.get(k).cloned())
            .collect())
    }
}
