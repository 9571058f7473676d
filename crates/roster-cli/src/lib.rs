//! Roster operator CLI
//!
//! Loads an [`EngineConfig`] from TOML and the store from a JSON snapshot,
//! runs one engine operation and returns its result as JSON.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

use anyhow::Context;
use clap::{Parser, Subcommand};
use roster_core::effects::{LogActivityRecorder, LogNotifier};
use roster_core::{
    CreateRoleRequest, EngineConfig, ReconcileRequest, RoleId, RosterEngine, RosterStores,
    SocietyId, StudentId, UpdateRoleRequest,
};
use roster_store::{InMemoryStore, Snapshot};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "roster", version, about = "Society role and privilege management")]
pub struct Cli {
    /// Engine configuration (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Store snapshot (JSON); a missing file starts an empty store
    #[arg(long, global = true)]
    pub snapshot: Option<PathBuf>,

    /// Write the store back to the snapshot when the command succeeds
    #[arg(long, global = true, requires = "snapshot")]
    pub save: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the baseline role of a society
    Provision {
        #[arg(long)]
        actor: StudentId,
        #[arg(long)]
        society: SocietyId,
    },

    /// Record a membership and attach the baseline role
    AddMember {
        #[arg(long)]
        society: SocietyId,
        #[arg(long)]
        student: StudentId,
    },

    /// List a society's roles with holder counts
    Roles {
        #[arg(long)]
        society: SocietyId,
    },

    /// Set a student's roles in a society
    Reconcile {
        #[arg(long)]
        actor: StudentId,
        #[arg(long)]
        student: StudentId,
        #[arg(long)]
        society: SocietyId,
        /// Desired role (repeatable)
        #[arg(long = "role")]
        roles: Vec<RoleId>,
        /// Strip every role except the baseline
        #[arg(long, conflicts_with = "roles")]
        clear: bool,
    },

    /// Create a role
    CreateRole {
        #[arg(long)]
        actor: StudentId,
        #[arg(long)]
        society: SocietyId,
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        min_semester: Option<u8>,
        /// Privilege key (repeatable)
        #[arg(long = "privilege")]
        privileges: Vec<String>,
        /// Initial holder (repeatable)
        #[arg(long = "member")]
        members: Vec<StudentId>,
    },

    /// Update a role; list options replace the stored lists
    UpdateRole {
        #[arg(long)]
        actor: StudentId,
        #[arg(long)]
        society: SocietyId,
        #[arg(long)]
        role: RoleId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        min_semester: Option<u8>,
        /// Comma-separated privilege keys
        #[arg(long, value_delimiter = ',', num_args = 0..)]
        privileges: Option<Vec<String>>,
        /// Comma-separated holders
        #[arg(long, value_delimiter = ',', num_args = 0..)]
        members: Option<Vec<StudentId>>,
    },

    /// Delete a role and its assignments
    DeleteRole {
        #[arg(long)]
        actor: StudentId,
        #[arg(long)]
        society: SocietyId,
        #[arg(long)]
        role: RoleId,
    },

    /// Walk through a small society in a fresh store
    Demo,
}

impl Command {
    fn mutates(&self) -> bool {
        !matches!(self, Self::Roles { .. } | Self::Demo)
    }
}

/// Install the global subscriber; `RUST_LOG` overrides the `info` default
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Read engine configuration, falling back to defaults
pub fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

/// Open the store from a snapshot, or seed the default privilege catalog
pub fn load_store(path: Option<&Path>) -> anyhow::Result<InMemoryStore> {
    match path {
        Some(path) if path.exists() => {
            let snapshot = Snapshot::load(path)?;
            Ok(InMemoryStore::from_snapshot(snapshot)?)
        }
        _ => Ok(InMemoryStore::with_default_privileges()),
    }
}

/// Run one command and return its JSON output
pub async fn run(cli: Cli) -> anyhow::Result<Value> {
    let config = load_config(cli.config.as_deref())?;
    let store = Arc::new(load_store(cli.snapshot.as_deref())?);
    let engine = RosterEngine::new(
        config,
        RosterStores::shared(Arc::clone(&store)),
        Arc::new(LogNotifier),
        Arc::new(LogActivityRecorder),
    );

    let mutates = cli.command.mutates();
    let result = execute(&engine, &store, cli.command).await;
    engine.shutdown().await;
    let output = result?;

    if cli.save && mutates {
        if let Some(path) = &cli.snapshot {
            store.snapshot().save(path)?;
            tracing::info!(path = %path.display(), "Saved snapshot");
        }
    }
    Ok(output)
}

async fn execute(engine: &RosterEngine, store: &InMemoryStore, command: Command) -> anyhow::Result<Value> {
    let output = match command {
        Command::Provision { actor, society } => {
            serde_json::to_value(engine.provision_society(actor, society).await?)?
        }
        Command::AddMember { society, student } => {
            store.add_membership(student, society);
            let outcome = engine
                .reconcile_student_roles(ReconcileRequest::unspecified(student, student, society))
                .await?;
            serde_json::to_value(outcome)?
        }
        Command::Roles { society } => serde_json::to_value(engine.list_society_roles(society).await?)?,
        Command::Reconcile {
            actor,
            student,
            society,
            roles,
            clear,
        } => {
            let request = if clear || !roles.is_empty() {
                ReconcileRequest::new(actor, student, society, roles)
            } else {
                ReconcileRequest::unspecified(actor, student, society)
            };
            serde_json::to_value(engine.reconcile_student_roles(request).await?)?
        }
        Command::CreateRole {
            actor,
            society,
            name,
            description,
            min_semester,
            privileges,
            members,
        } => {
            let mut request = CreateRoleRequest::new(actor, society, name).with_privileges(privileges);
            if !members.is_empty() {
                request = request.with_members(members);
            }
            if let Some(description) = description {
                request = request.with_description(description);
            }
            if let Some(semester) = min_semester {
                request = request.with_min_semester(semester);
            }
            serde_json::to_value(engine.create_role(request).await?)?
        }
        Command::UpdateRole {
            actor,
            society,
            role,
            name,
            description,
            min_semester,
            privileges,
            members,
        } => {
            let request = UpdateRoleRequest {
                name,
                description,
                min_semester,
                privilege_keys: privileges,
                member_ids: members,
                ..UpdateRoleRequest::new(actor, role, society)
            };
            serde_json::to_value(engine.update_role(request).await?)?
        }
        Command::DeleteRole { actor, society, role } => {
            serde_json::to_value(engine.delete_role(actor, role, society).await?)?
        }
        Command::Demo => demo(engine, store).await?,
    };
    Ok(output)
}

async fn demo(engine: &RosterEngine, store: &InMemoryStore) -> anyhow::Result<Value> {
    let society = SocietyId::new();
    let president = StudentId::new();
    let student = StudentId::new();
    store.add_membership(president, society);
    store.add_membership(student, society);

    let baseline = engine.provision_society(president, society).await?;
    let treasurer = engine
        .create_role(
            CreateRoleRequest::new(president, society, "Treasurer")
                .with_privileges(["payment_handling"])
                .with_min_semester(2),
        )
        .await?;
    let secretary = engine
        .create_role(
            CreateRoleRequest::new(president, society, "Secretary")
                .with_privileges(["meeting_management", "announcement_management"])
                .with_members(vec![president]),
        )
        .await?;

    let first = engine
        .reconcile_student_roles(ReconcileRequest::new(
            president,
            student,
            society,
            vec![treasurer.role.id],
        ))
        .await?;
    let second = engine
        .reconcile_student_roles(ReconcileRequest::new(
            president,
            student,
            society,
            vec![secretary.role.id],
        ))
        .await?;
    let repeat = engine
        .reconcile_student_roles(ReconcileRequest::new(
            president,
            student,
            society,
            vec![secretary.role.id],
        ))
        .await?;
    let roles = engine.list_society_roles(society).await?;

    Ok(json!({
        "society": society,
        "baseline": baseline.name,
        "steps": [first.message, second.message, repeat.message],
        "roles": roles,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn save_requires_snapshot() {
        let parsed = Cli::try_parse_from(["roster", "--save", "demo"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn clear_conflicts_with_roles() {
        let role = RoleId::new().to_string();
        let society = SocietyId::new().to_string();
        let student = StudentId::new().to_string();
        let parsed = Cli::try_parse_from([
            "roster", "reconcile", "--actor", &student, "--student", &student, "--society", &society,
            "--role", &role, "--clear",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn missing_config_path_uses_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config.baseline_role_name, "Member");
    }
}
