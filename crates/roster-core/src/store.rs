//! Store contracts consumed by the engine
//!
//! The engine never talks to a database directly. Each trait below is one
//! slice of the persistence boundary; every mutating method is expected to be
//! a single atomic unit that either lands completely or not at all.

use crate::error::StoreError;
use crate::types::{Privilege, Role, RoleDiff, RoleId, SocietyId, StudentId};
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Student-to-role assignments within a society
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    /// Role IDs the student currently holds in the society
    async fn find_current_roles(
        &self,
        student: StudentId,
        society: SocietyId,
    ) -> Result<BTreeSet<RoleId>, StoreError>;

    /// Create every `to_add` assignment and delete every `to_remove` one.
    ///
    /// Atomic: on error the assignment set is left untouched.
    async fn apply_diff(
        &self,
        student: StudentId,
        society: SocietyId,
        diff: &RoleDiff,
    ) -> Result<(), StoreError>;
}

/// Role definitions and their privilege links
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Role by ID, from any society
    async fn find_role(&self, role_id: RoleId) -> Result<Option<Role>, StoreError>;

    /// All roles of a society
    async fn find_roles_by_society(&self, society: SocietyId) -> Result<Vec<Role>, StoreError>;

    /// The society's baseline role, if one is defined
    async fn find_baseline_role(&self, society: SocietyId) -> Result<Option<Role>, StoreError>;

    /// Students currently holding the role
    async fn find_role_members(&self, role_id: RoleId) -> Result<BTreeSet<StudentId>, StoreError>;

    /// Insert the role, link its privileges and assign `members`.
    ///
    /// Atomic. Fails with [`StoreError::Conflict`] when the society already
    /// has a role with the same normalized name.
    async fn insert_role(&self, role: &Role, members: &BTreeSet<StudentId>) -> Result<(), StoreError>;

    /// Overwrite the stored role, replacing its privilege links wholesale.
    ///
    /// When `members` is given the role's holder list becomes exactly that
    /// set. Atomic. Returns the holders as they were just before the write.
    async fn replace_role(
        &self,
        role: &Role,
        members: Option<BTreeSet<StudentId>>,
    ) -> Result<BTreeSet<StudentId>, StoreError>;

    /// Delete the role's assignments, detach its privileges, then delete it.
    ///
    /// Atomic. Returns the students that held the role.
    async fn delete_role(&self, role_id: RoleId) -> Result<BTreeSet<StudentId>, StoreError>;
}

/// Society membership facts (read only)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Whether the student is an active member of the society
    async fn is_member(&self, student: StudentId, society: SocietyId) -> Result<bool, StoreError>;

    /// The subset of `candidates` that are active members of the society
    async fn find_members_of(
        &self,
        society: SocietyId,
        candidates: &BTreeSet<StudentId>,
    ) -> Result<BTreeSet<StudentId>, StoreError>;
}

/// The fixed privilege catalog
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PrivilegeStore: Send + Sync {
    /// Catalog entries matching `keys`; unknown keys are simply absent
    async fn resolve(&self, keys: &[String]) -> Result<Vec<Privilege>, StoreError>;
}
