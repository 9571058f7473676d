//! End-to-end runs of the CLI against snapshot files

use clap::Parser;
use pretty_assertions::assert_eq;
use roster_cli::{load_config, run, Cli};
use roster_core::{ConcurrencyMode, RemovalNotice, SocietyId, StudentId};
use roster_store::Snapshot;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

async fn roster(snapshot: &Path, args: &[&str]) -> anyhow::Result<Value> {
    let path = snapshot.to_string_lossy().into_owned();
    let mut argv = vec!["roster", "--snapshot", path.as_str(), "--save"];
    argv.extend_from_slice(args);
    run(Cli::try_parse_from(argv)?).await
}

#[tokio::test]
async fn commands_persist_through_the_snapshot() {
    let dir = TempDir::new().unwrap();
    let snapshot = dir.path().join("roster.json");
    let society = SocietyId::new().to_string();
    let president = StudentId::new().to_string();
    let student = StudentId::new().to_string();

    let baseline = roster(&snapshot, &["provision", "--actor", &president, "--society", &society])
        .await
        .unwrap();
    assert_eq!(baseline["is_baseline"], Value::Bool(true));

    for who in [&president, &student] {
        roster(&snapshot, &["add-member", "--society", &society, "--student", who])
            .await
            .unwrap();
    }

    let created = roster(
        &snapshot,
        &[
            "create-role", "--actor", &president, "--society", &society, "--name", "Treasurer",
            "--privilege", "payment_handling",
        ],
    )
    .await
    .unwrap();
    let treasurer = created["role"]["id"].as_str().unwrap().to_string();

    let outcome = roster(
        &snapshot,
        &[
            "reconcile", "--actor", &president, "--student", &student, "--society", &society,
            "--role", &treasurer,
        ],
    )
    .await
    .unwrap();
    assert_eq!(outcome["message"], "1 role added, 0 roles removed");

    let saved = Snapshot::load(&snapshot).unwrap();
    assert_eq!(saved.roles.len(), 2);
    assert_eq!(saved.memberships.len(), 2);
    assert_eq!(saved.assignments.len(), 3);

    let listing = roster(&snapshot, &["roles", "--society", &society]).await.unwrap();
    let counts: Vec<(String, u64)> = listing
        .as_array()
        .unwrap()
        .iter()
        .map(|l| {
            (
                l["role"]["name"].as_str().unwrap().to_string(),
                l["holder_count"].as_u64().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        counts,
        vec![("Member".to_string(), 2), ("Treasurer".to_string(), 1)]
    );
}

#[tokio::test]
async fn failed_commands_leave_the_snapshot_alone() {
    let dir = TempDir::new().unwrap();
    let snapshot = dir.path().join("roster.json");
    let society = SocietyId::new().to_string();
    let actor = StudentId::new().to_string();

    roster(&snapshot, &["provision", "--actor", &actor, "--society", &society])
        .await
        .unwrap();
    let before = std::fs::read_to_string(&snapshot).unwrap();

    let err = roster(
        &snapshot,
        &["create-role", "--actor", &actor, "--society", &society, "--name", "member"],
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("member"));
    assert_eq!(std::fs::read_to_string(&snapshot).unwrap(), before);
}

#[tokio::test]
async fn demo_runs_in_a_fresh_store() {
    let output = run(Cli::try_parse_from(["roster", "demo"]).unwrap()).await.unwrap();

    assert_eq!(output["baseline"], "Member");
    assert_eq!(output["steps"][2], roster_core::NO_CHANGES_MESSAGE);
    assert_eq!(output["roles"].as_array().unwrap().len(), 3);
}

#[test]
fn config_file_overrides_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("roster.toml");
    std::fs::write(
        &path,
        "baseline_role_name = \"Associate\"\nremoval_notice = \"notify\"\nconcurrency = \"last_write_wins\"\n",
    )
    .unwrap();

    let config = load_config(Some(&path)).unwrap();

    assert_eq!(config.baseline_role_name, "Associate");
    assert_eq!(config.removal_notice, RemovalNotice::Notify);
    assert_eq!(config.concurrency, ConcurrencyMode::LastWriteWins);
    assert_eq!(config.max_role_name_len, 64);
}

#[test]
fn unknown_config_values_are_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("roster.toml");
    std::fs::write(&path, "removal_notice = \"shout\"\n").unwrap();

    assert!(load_config(Some(&path)).is_err());
}
