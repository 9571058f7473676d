//! Error types for Roster Core
//!
//! Provides error handling for:
//! - Malformed input rejected before any mutation
//! - Membership, role and privilege lookups
//! - Name collisions in the role catalog
//! - Failed atomic writes at the store boundary

use crate::types::{RoleId, SocietyId, StudentId};

/// Main Roster error type
#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    /// Malformed or missing input
    #[error("validation failed: {0}")]
    Validation(String),

    /// Student is not a member of the society
    #[error("student {student} is not a member of society {society}")]
    Membership {
        student: StudentId,
        society: SocietyId,
    },

    /// Referenced roles do not belong to the society
    #[error("roles not found in society {society}: {role_ids:?}")]
    InvalidRole {
        society: SocietyId,
        role_ids: Vec<RoleId>,
    },

    /// Referenced privilege keys are not in the catalog
    #[error("unknown privilege keys: {keys:?}")]
    InvalidPrivilege { keys: Vec<String> },

    /// A role with this name already exists in the society
    #[error("role '{name}' already exists in society {society}")]
    DuplicateRole { society: SocietyId, name: String },

    /// Role absent or owned by another society
    #[error("role {role_id} not found in society {society}")]
    NotFound { role_id: RoleId, society: SocietyId },

    /// The atomic write failed and was rolled back
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl RosterError {
    /// Nothing was changed because the request itself was bad
    #[inline]
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        !matches!(self, Self::Persistence(_))
    }

    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Persistence(StoreError::Unavailable(_) | StoreError::Conflict(_))
        )
    }

    /// Create validation error
    #[inline]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Errors reported by store implementations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A concurrent write or uniqueness constraint collided
    #[error("conflict: {0}")]
    Conflict(String),

    /// The write referenced missing or foreign rows
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// The backing store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
