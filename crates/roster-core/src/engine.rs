//! Roster engine
//!
//! The surface presented to callers. Wires the stores, the membership gate,
//! the role catalog, the reconciler and the side-effect dispatcher together.
//! All identifiers passed in are assumed to be authenticated and authorized
//! already.

use crate::catalog::RoleCatalogManager;
use crate::config::EngineConfig;
use crate::effects::{ActivityRecorder, DispatchStats, NotificationDispatcher, SideEffectDispatcher};
use crate::error::RosterError;
use crate::membership::MembershipValidator;
use crate::privileges::PrivilegeCatalog;
use crate::reconcile::RoleReconciler;
use crate::store::{AssignmentStore, MembershipStore, PrivilegeStore, RoleStore};
use crate::types::{
    CreateRoleRequest, ReconcileOutcome, ReconcileRequest, Role, RoleCreated, RoleDeleted, RoleId,
    RoleListing, RoleUpdated, SocietyId, StudentId, UpdateRoleRequest,
};
use std::sync::Arc;

/// The store contracts the engine needs
#[derive(Clone)]
pub struct RosterStores {
    /// Assignment reads and atomic diffs
    pub assignments: Arc<dyn AssignmentStore>,
    /// Role definitions
    pub roles: Arc<dyn RoleStore>,
    /// Membership facts
    pub memberships: Arc<dyn MembershipStore>,
    /// Privilege catalog
    pub privileges: Arc<dyn PrivilegeStore>,
}

impl RosterStores {
    /// Use one backend for every contract
    #[must_use]
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: AssignmentStore + RoleStore + MembershipStore + PrivilegeStore + 'static,
    {
        Self {
            assignments: store.clone(),
            roles: store.clone(),
            memberships: store.clone(),
            privileges: store,
        }
    }
}

impl std::fmt::Debug for RosterStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RosterStores").finish_non_exhaustive()
    }
}

/// Society role engine
#[derive(Debug)]
pub struct RosterEngine {
    /// Configuration
    config: Arc<EngineConfig>,
    /// Role definitions
    catalog: RoleCatalogManager,
    /// Student role diffs
    reconciler: RoleReconciler,
    /// Detached notifications and activity entries
    effects: Arc<SideEffectDispatcher>,
}

impl RosterEngine {
    /// Create engine and spawn its side-effect worker.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        stores: RosterStores,
        notifier: Arc<dyn NotificationDispatcher>,
        recorder: Arc<dyn ActivityRecorder>,
    ) -> Self {
        let config = Arc::new(config);
        let effects = Arc::new(SideEffectDispatcher::spawn(
            notifier,
            recorder,
            config.side_effect_queue_capacity,
            config.side_effect_timeout(),
        ));
        let membership = MembershipValidator::new(stores.memberships);
        let privileges = PrivilegeCatalog::new(stores.privileges, Arc::clone(&stores.roles));

        let catalog = RoleCatalogManager::new(
            Arc::clone(&config),
            Arc::clone(&stores.roles),
            privileges,
            membership.clone(),
            Arc::clone(&effects),
        );
        let reconciler = RoleReconciler::new(
            stores.roles,
            stores.assignments,
            membership,
            Arc::clone(&effects),
            config.concurrency,
        );

        Self {
            config,
            catalog,
            reconciler,
            effects,
        }
    }

    /// Reconcile a student's roles in a society
    pub async fn reconcile_student_roles(
        &self,
        request: ReconcileRequest,
    ) -> Result<ReconcileOutcome, RosterError> {
        let student = request.student;
        let society = request.society;
        match self.reconciler.reconcile(request).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::warn!(student = %student, society = %society, error = %e, "Reconciliation failed");
                Err(e)
            }
        }
    }

    /// Create a role
    pub async fn create_role(&self, request: CreateRoleRequest) -> Result<RoleCreated, RosterError> {
        self.catalog.create_role(request).await
    }

    /// Update a role
    pub async fn update_role(&self, request: UpdateRoleRequest) -> Result<RoleUpdated, RosterError> {
        self.catalog.update_role(request).await
    }

    /// Delete a role and every assignment of it
    pub async fn delete_role(
        &self,
        actor: StudentId,
        role_id: RoleId,
        society: SocietyId,
    ) -> Result<RoleDeleted, RosterError> {
        self.catalog.delete_role(actor, role_id, society).await
    }

    /// List a society's roles with holder counts
    pub async fn list_society_roles(&self, society: SocietyId) -> Result<Vec<RoleListing>, RosterError> {
        self.catalog.list_society_roles(society).await
    }

    /// Give a society its baseline role if it has none
    pub async fn provision_society(
        &self,
        actor: StudentId,
        society: SocietyId,
    ) -> Result<Role, RosterError> {
        self.catalog.ensure_baseline_role(actor, society).await
    }

    /// Get configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get side-effect statistics
    #[inline]
    #[must_use]
    pub fn dispatch_stats(&self) -> DispatchStats {
        self.effects.stats()
    }

    /// Drain pending side effects and stop the worker
    pub async fn shutdown(&self) {
        self.effects.shutdown().await;
    }
}
