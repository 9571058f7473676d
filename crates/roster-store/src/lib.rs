//! In-memory storage backend for Roster
//!
//! Provides [`InMemoryStore`], which implements every store contract of
//! `roster-core` with all-or-nothing writes, and [`Snapshot`] for moving its
//! contents to and from JSON files.

#![warn(unreachable_pub)]

pub mod memory;
pub mod snapshot;

pub use memory::{InMemoryStore, DEFAULT_PRIVILEGE_KEYS};
pub use snapshot::{Snapshot, SnapshotError};
