//! Membership precondition checks
//!
//! Every role mutation first confirms that the affected students are active
//! members of the society, so no assignment can exist without a membership.

use crate::error::RosterError;
use crate::store::MembershipStore;
use crate::types::{SocietyId, StudentId};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Read-only gate over [`MembershipStore`]
#[derive(Clone)]
pub struct MembershipValidator {
    store: Arc<dyn MembershipStore>,
}

impl MembershipValidator {
    /// Create validator
    #[inline]
    #[must_use]
    pub fn new(store: Arc<dyn MembershipStore>) -> Self {
        Self { store }
    }

    /// Whether the student is an active member of the society
    pub async fn is_member(&self, student: StudentId, society: SocietyId) -> Result<bool, RosterError> {
        Ok(self.store.is_member(student, society).await?)
    }

    /// Fail with [`RosterError::Membership`] unless the student is a member
    pub async fn ensure_member(&self, student: StudentId, society: SocietyId) -> Result<(), RosterError> {
        if self.is_member(student, society).await? {
            Ok(())
        } else {
            Err(RosterError::Membership { student, society })
        }
    }

    /// Split `candidates` into confirmed members and skipped non-members
    pub async fn confirmed_members(
        &self,
        society: SocietyId,
        candidates: &[StudentId],
    ) -> Result<(BTreeSet<StudentId>, BTreeSet<StudentId>), RosterError> {
        let candidates: BTreeSet<StudentId> = candidates.iter().copied().collect();
        if candidates.is_empty() {
            return Ok((BTreeSet::new(), BTreeSet::new()));
        }

        let found = self.store.find_members_of(society, &candidates).await?;
        let (confirmed, skipped) = candidates.into_iter().partition(|id| found.contains(id));
        Ok((confirmed, skipped))
    }
}

impl std::fmt::Debug for MembershipValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MembershipValidator").finish_non_exhaustive()
    }
}
