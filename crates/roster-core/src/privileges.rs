//! Privilege catalog lookups
//!
//! Privilege keys form a closed set owned by the [`PrivilegeStore`]. Keys are
//! validated here, at the boundary, and unknown keys are rejected eagerly so
//! that no role can ever reference a privilege the catalog does not know.

use crate::error::RosterError;
use crate::store::{PrivilegeStore, RoleStore};
use crate::types::{Privilege, Role, SocietyId};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Read-only view of valid privileges and society roles
#[derive(Clone)]
pub struct PrivilegeCatalog {
    privileges: Arc<dyn PrivilegeStore>,
    roles: Arc<dyn RoleStore>,
}

impl PrivilegeCatalog {
    /// Create catalog view
    #[inline]
    #[must_use]
    pub fn new(privileges: Arc<dyn PrivilegeStore>, roles: Arc<dyn RoleStore>) -> Self {
        Self { privileges, roles }
    }

    /// Resolve privilege keys to catalog entries.
    ///
    /// Keys are trimmed and de-duplicated first. Exactly one entry must come
    /// back per key.
    ///
    /// # Errors
    /// - `RosterError::Validation` if a key is blank
    /// - `RosterError::InvalidPrivilege` naming every unknown key
    pub async fn resolve(&self, keys: &[String]) -> Result<Vec<Privilege>, RosterError> {
        let wanted: BTreeSet<String> = keys.iter().map(|k| k.trim().to_string()).collect();
        if wanted.contains("") {
            return Err(RosterError::validation("privilege keys must not be blank"));
        }
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let request: Vec<String> = wanted.iter().cloned().collect();
        let resolved = self.privileges.resolve(&request).await?;

        let found: BTreeSet<&str> = resolved.iter().map(|p| p.key.as_str()).collect();
        if resolved.len() != wanted.len() || found.len() != wanted.len() {
            let unknown: Vec<String> = wanted
                .iter()
                .filter(|k| !found.contains(k.as_str()))
                .cloned()
                .collect();
            return Err(RosterError::InvalidPrivilege { keys: unknown });
        }

        Ok(resolved)
    }

    /// Resolve keys and return them as a role's privilege set
    pub async fn resolve_keys(&self, keys: &[String]) -> Result<BTreeSet<String>, RosterError> {
        Ok(self
            .resolve(keys)
            .await?
            .into_iter()
            .map(|p| p.key)
            .collect())
    }

    /// All roles of a society
    pub async fn roles_of(&self, society: SocietyId) -> Result<Vec<Role>, RosterError> {
        Ok(self.roles.find_roles_by_society(society).await?)
    }
}

impl std::fmt::Debug for PrivilegeCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivilegeCatalog").finish_non_exhaustive()
    }
}
