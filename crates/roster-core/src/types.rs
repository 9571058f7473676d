//! Core types for Roster
//!
//! Defines the fundamental domain types:
//! - Identifiers for students, societies, roles and privileges
//! - Roles, privileges and assignments
//! - Role diffs produced by reconciliation
//! - Request and outcome types for the exposed operations

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use ulid::Ulid;

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Ulid);

        impl $name {
            /// Generate new identifier
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ulid::from_string(s).map(Self)
            }
        }
    };
}

ulid_id!(
    /// Unique student identifier
    StudentId
);
ulid_id!(
    /// Unique society identifier
    SocietyId
);
ulid_id!(
    /// Unique role identifier
    RoleId
);
ulid_id!(
    /// Unique privilege identifier
    PrivilegeId
);

/// A privilege-bearing role scoped to one society
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role ID
    pub id: RoleId,
    /// Owning society
    pub society_id: SocietyId,
    /// Display name, unique per society ignoring case
    pub name: String,
    /// Optional free-text description
    #[serde(default)]
    pub description: Option<String>,
    /// Minimum semester a holder must have reached
    #[serde(default)]
    pub min_semester: Option<u8>,
    /// Privilege keys granted by this role
    #[serde(default)]
    pub privilege_keys: BTreeSet<String>,
    /// Whether this is the society's baseline role
    #[serde(default)]
    pub is_baseline: bool,
}

impl Role {
    /// Create a non-baseline role with no privileges
    #[must_use]
    pub fn new(society_id: SocietyId, name: impl Into<String>) -> Self {
        Self {
            id: RoleId::new(),
            society_id,
            name: name.into(),
            description: None,
            min_semester: None,
            privilege_keys: BTreeSet::new(),
            is_baseline: false,
        }
    }

    /// Create the baseline role for a society
    #[must_use]
    pub fn baseline(society_id: SocietyId, name: impl Into<String>) -> Self {
        Self {
            is_baseline: true,
            ..Self::new(society_id, name)
        }
    }

    /// With privilege keys
    #[must_use]
    pub fn with_privileges<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.privilege_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// With description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Key used for the case-insensitive uniqueness check
    #[inline]
    #[must_use]
    pub fn name_key(&self) -> String {
        normalize_name(&self.name)
    }
}

/// Normalize a role name for uniqueness comparison
#[inline]
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Entry of the fixed privilege catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Privilege {
    /// Privilege ID
    pub id: PrivilegeId,
    /// Stable key referenced by roles
    pub key: String,
}

impl Privilege {
    /// Create a catalog entry with a fresh ID
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            id: PrivilegeId::new(),
            key: key.into(),
        }
    }
}

/// The fact that a student holds a role within a society
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Assignment {
    /// Holder
    pub student_id: StudentId,
    /// Society scope
    pub society_id: SocietyId,
    /// Held role
    pub role_id: RoleId,
}

/// Active membership of a student in a society
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Membership {
    /// Member
    pub student_id: StudentId,
    /// Society
    pub society_id: SocietyId,
}

/// Add/remove sets computed by the reconciler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleDiff {
    /// Roles to assign
    pub to_add: BTreeSet<RoleId>,
    /// Roles to revoke
    pub to_remove: BTreeSet<RoleId>,
}

impl RoleDiff {
    /// Compute the diff from `current` to `desired`.
    ///
    /// The baseline role is never scheduled for removal.
    #[must_use]
    pub fn compute(
        current: &BTreeSet<RoleId>,
        desired: &BTreeSet<RoleId>,
        baseline: Option<RoleId>,
    ) -> Self {
        let to_add = desired.difference(current).copied().collect();
        let to_remove = current
            .difference(desired)
            .copied()
            .filter(|id| Some(*id) != baseline)
            .collect();
        Self { to_add, to_remove }
    }

    /// True when applying would change nothing
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Result of applying this diff to `current`
    #[must_use]
    pub fn apply_to(&self, current: &BTreeSet<RoleId>) -> BTreeSet<RoleId> {
        current
            .difference(&self.to_remove)
            .chain(self.to_add.iter())
            .copied()
            .collect()
    }

    /// Human-readable summary, e.g. "2 roles added, 1 role removed"
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return NO_CHANGES_MESSAGE.to_string();
        }
        format!(
            "{} added, {} removed",
            plural(self.to_add.len(), "role"),
            plural(self.to_remove.len(), "role")
        )
    }
}

/// Message returned when reconciliation changes nothing
pub const NO_CHANGES_MESSAGE: &str = "No changes to student roles.";

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// Request to reconcile a student's roles within a society
#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    /// Who is performing the change
    pub actor: StudentId,
    /// Whose roles change
    pub student: StudentId,
    /// Society scope
    pub society: SocietyId,
    /// Desired role set.
    ///
    /// `None` means the caller supplied no role list and is reconciled like an
    /// empty one, except that an empty diff short-circuits. `Some(vec![])`
    /// strips everything but the baseline and always runs the apply step.
    pub role_ids: Option<Vec<RoleId>>,
}

impl ReconcileRequest {
    /// Create request with an explicit desired role list
    #[must_use]
    pub fn new(actor: StudentId, student: StudentId, society: SocietyId, role_ids: Vec<RoleId>) -> Self {
        Self {
            actor,
            student,
            society,
            role_ids: Some(role_ids),
        }
    }

    /// Create request without a role list
    #[must_use]
    pub fn unspecified(actor: StudentId, student: StudentId, society: SocietyId) -> Self {
        Self {
            actor,
            student,
            society,
            role_ids: None,
        }
    }
}

/// Result of a reconciliation
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    /// Roles the student holds after the call
    pub applied_roles: Vec<Role>,
    /// Roles assigned by this call
    pub added: BTreeSet<RoleId>,
    /// Roles revoked by this call
    pub removed: BTreeSet<RoleId>,
    /// Human-readable summary
    pub message: String,
}

/// Request to create a role
#[derive(Debug, Clone)]
pub struct CreateRoleRequest {
    /// Who is performing the change
    pub actor: StudentId,
    /// Owning society
    pub society: SocietyId,
    /// Role name
    pub name: String,
    /// Optional description
    pub description: Option<String>,
    /// Optional minimum semester
    pub min_semester: Option<u8>,
    /// Privilege keys to link
    pub privilege_keys: Vec<String>,
    /// Students to assign immediately; non-members are skipped
    pub member_ids: Option<Vec<StudentId>>,
}

impl CreateRoleRequest {
    /// Create request with just a name
    #[must_use]
    pub fn new(actor: StudentId, society: SocietyId, name: impl Into<String>) -> Self {
        Self {
            actor,
            society,
            name: name.into(),
            description: None,
            min_semester: None,
            privilege_keys: Vec::new(),
            member_ids: None,
        }
    }

    /// With privilege keys
    #[must_use]
    pub fn with_privileges<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.privilege_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// With initial members
    #[must_use]
    pub fn with_members(mut self, members: Vec<StudentId>) -> Self {
        self.member_ids = Some(members);
        self
    }

    /// With description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// With minimum semester
    #[must_use]
    pub fn with_min_semester(mut self, semester: u8) -> Self {
        self.min_semester = Some(semester);
        self
    }
}

/// Result of role creation
#[derive(Debug, Clone, Serialize)]
pub struct RoleCreated {
    /// The stored role
    pub role: Role,
    /// Students that received the role
    pub assigned: BTreeSet<StudentId>,
    /// Requested students dropped because they are not members
    pub skipped: BTreeSet<StudentId>,
}

/// Request to update a role; `None` fields are left untouched
#[derive(Debug, Clone)]
pub struct UpdateRoleRequest {
    /// Who is performing the change
    pub actor: StudentId,
    /// Role to update
    pub role_id: RoleId,
    /// Society the role must belong to
    pub society: SocietyId,
    /// New name
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New minimum semester
    pub min_semester: Option<u8>,
    /// Replacement privilege set
    pub privilege_keys: Option<Vec<String>>,
    /// Replacement holder list
    pub member_ids: Option<Vec<StudentId>>,
}

impl UpdateRoleRequest {
    /// Create request that changes nothing yet
    #[must_use]
    pub fn new(actor: StudentId, role_id: RoleId, society: SocietyId) -> Self {
        Self {
            actor,
            role_id,
            society,
            name: None,
            description: None,
            min_semester: None,
            privilege_keys: None,
            member_ids: None,
        }
    }

    /// Rename
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replace privileges
    #[must_use]
    pub fn with_privileges<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.privilege_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Replace holders
    #[must_use]
    pub fn with_members(mut self, members: Vec<StudentId>) -> Self {
        self.member_ids = Some(members);
        self
    }
}

/// Result of a role update
#[derive(Debug, Clone, Serialize)]
pub struct RoleUpdated {
    /// The stored role after the update
    pub role: Role,
    /// Students that gained the role
    pub added_members: BTreeSet<StudentId>,
    /// Students that lost the role
    pub removed_members: BTreeSet<StudentId>,
}

/// Result of a role deletion
#[derive(Debug, Clone, Serialize)]
pub struct RoleDeleted {
    /// The deleted role
    pub role: Role,
    /// Students whose assignment was removed
    pub former_holders: BTreeSet<StudentId>,
}

/// Role with its holder count, as listed for a society
#[derive(Debug, Clone, Serialize)]
pub struct RoleListing {
    /// The role
    pub role: Role,
    /// Number of students holding it
    pub holder_count: usize,
}
