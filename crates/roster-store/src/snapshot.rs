//! Serializable store contents
//!
//! A [`Snapshot`] is the full state of an [`InMemoryStore`](crate::InMemoryStore)
//! as plain lists, suitable for JSON files and fixtures.

use roster_core::{Assignment, Membership, Privilege, Role};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Full store state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    /// Privilege catalog
    pub privileges: Vec<Privilege>,
    /// Role definitions
    pub roles: Vec<Role>,
    /// Active memberships
    pub memberships: Vec<Membership>,
    /// Role assignments
    pub assignments: Vec<Assignment>,
}

impl Snapshot {
    /// Read a snapshot from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| SnapshotError::io(path, e))?;
        serde_json::from_str(&raw).map_err(|e| SnapshotError::Json {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Write the snapshot as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let path = path.as_ref();
        let raw = serde_json::to_string_pretty(self).map_err(|e| SnapshotError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::write(path, raw).map_err(|e| SnapshotError::io(path, e))
    }
}

/// Errors while loading or saving snapshots
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// IO error reading or writing the file
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File is not a valid snapshot document
    #[error("invalid snapshot json in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Snapshot contents break a store invariant
    #[error("inconsistent snapshot: {0}")]
    Inconsistent(String),
}

impl SnapshotError {
    /// Create IO error for path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
