//! Roster Core - society role reconciliation
//!
//! Keeps track of which privilege-bearing roles a student holds inside a
//! society:
//! - Maintains each society's role catalog (names, privileges, holders)
//! - Reconciles a student's roles to a desired set with a minimal diff
//! - Keeps the baseline role attached to every member
//! - Publishes notifications and audit entries off the response path
//!
//! # Example
//!
//! ```rust,ignore
//! use roster_core::{EngineConfig, ReconcileRequest, RosterEngine, RosterStores};
//! use roster_core::effects::{LogActivityRecorder, LogNotifier};
//!
//! # async fn example(store: std::sync::Arc<MyStore>) -> Result<(), Box<dyn std::error::Error>> {
//! let engine = RosterEngine::new(
//!     EngineConfig::new(),
//!     RosterStores::shared(store),
//!     std::sync::Arc::new(LogNotifier),
//!     std::sync::Arc::new(LogActivityRecorder),
//! );
//!
//! let outcome = engine
//!     .reconcile_student_roles(ReconcileRequest::new(actor, student, society, vec![treasurer]))
//!     .await?;
//! println!("{}", outcome.message);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod catalog;
pub mod config;
pub mod effects;
pub mod engine;
pub mod error;
pub mod membership;
pub mod privileges;
pub mod reconcile;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use catalog::RoleCatalogManager;
pub use config::{ConcurrencyMode, EngineConfig, RemovalNotice};
pub use effects::{
    ActivityAction, ActivityEntry, ActivityNature, ActivityRecorder, ChangeKind, DispatchStats,
    NotificationDispatcher, RoleChangeNotice, SideEffectDispatcher, TargetType,
};
pub use engine::{RosterEngine, RosterStores};
pub use error::{RosterError, StoreError};
pub use membership::MembershipValidator;
pub use privileges::PrivilegeCatalog;
pub use reconcile::{RoleReconciler, SubjectLocks};
pub use store::{AssignmentStore, MembershipStore, PrivilegeStore, RoleStore};
pub use types::{
    normalize_name, Assignment, CreateRoleRequest, Membership, Privilege, PrivilegeId, ReconcileOutcome,
    ReconcileRequest, Role, RoleCreated, RoleDeleted, RoleDiff, RoleId, RoleListing, RoleUpdated,
    SocietyId, StudentId, UpdateRoleRequest, NO_CHANGES_MESSAGE,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Roster Core
    pub use crate::{
        CreateRoleRequest, EngineConfig, ReconcileRequest, RosterEngine, RosterError,
        RosterStores, SocietyId, StudentId, UpdateRoleRequest,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
