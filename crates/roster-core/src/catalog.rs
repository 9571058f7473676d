//! Role catalog management
//!
//! Creates, updates and deletes role definitions for a society:
//! - Name validation and case-insensitive uniqueness
//! - Privilege keys resolved against the closed catalog
//! - Holder lists filtered down to confirmed members
//! - Detached notifications and activity entries after each commit

use crate::config::{EngineConfig, RemovalNotice};
use crate::effects::{
    ActivityAction, ActivityEntry, ActivityNature, ChangeKind, RoleChangeNotice,
    SideEffectDispatcher,
};
use crate::error::{RosterError, StoreError};
use crate::membership::MembershipValidator;
use crate::privileges::PrivilegeCatalog;
use crate::store::RoleStore;
use crate::types::{
    normalize_name, CreateRoleRequest, Role, RoleCreated, RoleDeleted, RoleId, RoleListing,
    RoleUpdated, SocietyId, StudentId, UpdateRoleRequest,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Manager for a society's role definitions
pub struct RoleCatalogManager {
    config: Arc<EngineConfig>,
    roles: Arc<dyn RoleStore>,
    privileges: PrivilegeCatalog,
    membership: MembershipValidator,
    effects: Arc<SideEffectDispatcher>,
}

impl RoleCatalogManager {
    /// Create manager
    #[must_use]
    pub fn new(
        config: Arc<EngineConfig>,
        roles: Arc<dyn RoleStore>,
        privileges: PrivilegeCatalog,
        membership: MembershipValidator,
        effects: Arc<SideEffectDispatcher>,
    ) -> Self {
        Self {
            config,
            roles,
            privileges,
            membership,
            effects,
        }
    }

    /// Create a role, optionally assigning it to an initial set of students
    ///
    /// Students in `member_ids` that are not members of the society are
    /// skipped rather than rejected; they are reported in
    /// [`RoleCreated::skipped`].
    ///
    /// # Errors
    /// - `RosterError::Validation` for a blank or overlong name, or an
    ///   out-of-range semester
    /// - `RosterError::InvalidPrivilege` for unknown keys
    /// - `RosterError::DuplicateRole` if the name is taken in the society
    /// - `RosterError::Persistence` if the insert fails
    pub async fn create_role(&self, request: CreateRoleRequest) -> Result<RoleCreated, RosterError> {
        let CreateRoleRequest {
            actor,
            society,
            name,
            description,
            min_semester,
            privilege_keys,
            member_ids,
        } = request;

        let name = self.validate_name(&name)?;
        self.validate_semester(min_semester)?;
        let privilege_keys = self.privileges.resolve_keys(&privilege_keys).await?;

        let existing = self.roles.find_roles_by_society(society).await?;
        ensure_unique(&existing, society, &name, None)?;

        let (assigned, skipped) = match member_ids {
            Some(ids) => self.membership.confirmed_members(society, &ids).await?,
            None => (BTreeSet::new(), BTreeSet::new()),
        };
        if !skipped.is_empty() {
            tracing::debug!(
                society = %society,
                skipped = skipped.len(),
                "Skipping non-members in new role's member list"
            );
        }

        let role = Role {
            description: clean_description(description),
            min_semester,
            privilege_keys,
            ..Role::new(society, name)
        };

        self.roles
            .insert_role(&role, &assigned)
            .await
            .map_err(|e| duplicate_on_conflict(e, &role))?;

        tracing::info!(
            role_id = %role.id,
            society = %society,
            members = assigned.len(),
            "Created role '{}'",
            role.name
        );

        self.effects.notify(RoleChangeNotice {
            role_id: role.id,
            society_id: society,
            member_ids: assigned.clone(),
            kind: ChangeKind::Added,
        });
        self.effects.record(ActivityEntry::for_role(
            actor,
            society,
            role.id,
            ActivityAction::RoleCreated,
            ActivityNature::Creation,
            format!("Created role '{}' with {} member(s)", role.name, assigned.len()),
        ));

        Ok(RoleCreated {
            role,
            assigned,
            skipped,
        })
    }

    /// Update a role; supplied privilege and member lists replace the old ones
    ///
    /// # Errors
    /// - `RosterError::NotFound` if the role is absent or owned by another
    ///   society
    /// - `RosterError::DuplicateRole` if a rename collides
    /// - `RosterError::Validation` for bad fields, or when replacing the
    ///   baseline role's members
    /// - `RosterError::InvalidPrivilege` for unknown keys
    /// - `RosterError::Persistence` if the write fails
    pub async fn update_role(&self, request: UpdateRoleRequest) -> Result<RoleUpdated, RosterError> {
        let UpdateRoleRequest {
            actor,
            role_id,
            society,
            name,
            description,
            min_semester,
            privilege_keys,
            member_ids,
        } = request;

        let mut role = self.find_owned(role_id, society).await?;

        if let Some(name) = name {
            let name = self.validate_name(&name)?;
            let existing = self.roles.find_roles_by_society(society).await?;
            ensure_unique(&existing, society, &name, Some(role.id))?;
            role.name = name;
        }
        if let Some(description) = description {
            role.description = clean_description(Some(description));
        }
        if min_semester.is_some() {
            self.validate_semester(min_semester)?;
            role.min_semester = min_semester;
        }
        if let Some(keys) = privilege_keys {
            role.privilege_keys = self.privileges.resolve_keys(&keys).await?;
        }

        let members = match member_ids {
            Some(_) if role.is_baseline => {
                return Err(RosterError::validation(
                    "the baseline role's members follow society membership and cannot be replaced",
                ));
            }
            Some(ids) => {
                let (confirmed, skipped) = self.membership.confirmed_members(society, &ids).await?;
                if !skipped.is_empty() {
                    tracing::debug!(
                        role_id = %role.id,
                        skipped = skipped.len(),
                        "Skipping non-members in replacement member list"
                    );
                }
                Some(confirmed)
            }
            None => None,
        };

        // Holder changes come from the set the store replaced, read under its write.
        let previous = self
            .roles
            .replace_role(&role, members.clone())
            .await
            .map_err(|e| duplicate_on_conflict(e, &role))?;
        let (added_members, removed_members) = match &members {
            Some(confirmed) => (
                confirmed.difference(&previous).copied().collect(),
                previous.difference(confirmed).copied().collect(),
            ),
            None => (BTreeSet::new(), BTreeSet::new()),
        };

        tracing::info!(
            role_id = %role.id,
            society = %society,
            added = added_members.len(),
            removed = removed_members.len(),
            "Updated role '{}'",
            role.name
        );

        self.effects.notify(RoleChangeNotice {
            role_id: role.id,
            society_id: society,
            member_ids: added_members.clone(),
            kind: ChangeKind::Added,
        });
        if self.config.removal_notice == RemovalNotice::Notify {
            self.effects.notify(RoleChangeNotice {
                role_id: role.id,
                society_id: society,
                member_ids: removed_members.clone(),
                kind: ChangeKind::Removed,
            });
        }
        self.effects.record(ActivityEntry::for_role(
            actor,
            society,
            role.id,
            ActivityAction::RoleUpdated,
            ActivityNature::Modification,
            format!(
                "Updated role '{}' ({} member(s) added, {} removed)",
                role.name,
                added_members.len(),
                removed_members.len()
            ),
        ));

        Ok(RoleUpdated {
            role,
            added_members,
            removed_members,
        })
    }

    /// Delete a role together with every assignment referencing it
    ///
    /// # Errors
    /// - `RosterError::NotFound` if the role is absent or owned by another
    ///   society
    /// - `RosterError::Validation` for the baseline role
    /// - `RosterError::Persistence` if the cascade fails; nothing is deleted
    pub async fn delete_role(
        &self,
        actor: StudentId,
        role_id: RoleId,
        society: SocietyId,
    ) -> Result<RoleDeleted, RosterError> {
        let role = self.find_owned(role_id, society).await?;
        if role.is_baseline {
            return Err(RosterError::validation("the baseline role cannot be deleted"));
        }

        let former_holders = self.roles.delete_role(role.id).await?;

        tracing::info!(
            role_id = %role.id,
            society = %society,
            former_holders = former_holders.len(),
            "Deleted role '{}'",
            role.name
        );

        self.effects.record(ActivityEntry::for_role(
            actor,
            society,
            role.id,
            ActivityAction::RoleDeleted,
            ActivityNature::Deletion,
            format!(
                "Deleted role '{}' held by {} member(s)",
                role.name,
                former_holders.len()
            ),
        ));

        Ok(RoleDeleted {
            role,
            former_holders,
        })
    }

    /// Every role of the society with its holder count.
    ///
    /// The baseline role is listed first, the rest by name.
    pub async fn list_society_roles(&self, society: SocietyId) -> Result<Vec<RoleListing>, RosterError> {
        let mut roles = self.privileges.roles_of(society).await?;
        roles.sort_by_key(|r| (!r.is_baseline, r.name_key()));

        let mut listings = Vec::with_capacity(roles.len());
        for role in roles {
            let holder_count = self.roles.find_role_members(role.id).await?.len();
            listings.push(RoleListing { role, holder_count });
        }
        Ok(listings)
    }

    /// Make sure the society has a baseline role, creating it if needed.
    ///
    /// Idempotent; returns the existing baseline when there is one.
    pub async fn ensure_baseline_role(
        &self,
        actor: StudentId,
        society: SocietyId,
    ) -> Result<Role, RosterError> {
        if let Some(existing) = self.roles.find_baseline_role(society).await? {
            return Ok(existing);
        }

        let role = Role::baseline(society, self.config.baseline_role_name.clone());
        let existing = self.roles.find_roles_by_society(society).await?;
        ensure_unique(&existing, society, &role.name, None)?;

        self.roles
            .insert_role(&role, &BTreeSet::new())
            .await
            .map_err(|e| duplicate_on_conflict(e, &role))?;

        tracing::info!(role_id = %role.id, society = %society, "Provisioned baseline role");
        self.effects.record(ActivityEntry::for_role(
            actor,
            society,
            role.id,
            ActivityAction::RoleCreated,
            ActivityNature::Creation,
            format!("Provisioned baseline role '{}'", role.name),
        ));

        Ok(role)
    }

    async fn find_owned(&self, role_id: RoleId, society: SocietyId) -> Result<Role, RosterError> {
        match self.roles.find_role(role_id).await? {
            Some(role) if role.society_id == society => Ok(role),
            _ => Err(RosterError::NotFound { role_id, society }),
        }
    }

    fn validate_name(&self, name: &str) -> Result<String, RosterError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RosterError::validation("role name must not be empty"));
        }
        if name.chars().count() > self.config.max_role_name_len {
            return Err(RosterError::validation(format!(
                "role name exceeds {} characters",
                self.config.max_role_name_len
            )));
        }
        Ok(name.to_string())
    }

    fn validate_semester(&self, semester: Option<u8>) -> Result<(), RosterError> {
        match semester {
            Some(s) if s == 0 || s > self.config.max_semester => Err(RosterError::validation(
                format!("minimum semester must be between 1 and {}", self.config.max_semester),
            )),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for RoleCatalogManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleCatalogManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn ensure_unique(
    existing: &[Role],
    society: SocietyId,
    name: &str,
    except: Option<RoleId>,
) -> Result<(), RosterError> {
    let key = normalize_name(name);
    let taken = existing
        .iter()
        .any(|r| Some(r.id) != except && r.name_key() == key);
    if taken {
        return Err(RosterError::DuplicateRole {
            society,
            name: name.to_string(),
        });
    }
    Ok(())
}

/// A name conflict reported by the store means another writer won the race
fn duplicate_on_conflict(error: StoreError, role: &Role) -> RosterError {
    match error {
        StoreError::Conflict(_) => RosterError::DuplicateRole {
            society: role.society_id,
            name: role.name.clone(),
        },
        other => RosterError::Persistence(other),
    }
}

fn clean_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}
