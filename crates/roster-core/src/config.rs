//! Engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Roster engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Conventional name of the baseline role
    pub baseline_role_name: String,
    /// Maximum role name length in characters
    pub max_role_name_len: usize,
    /// Highest accepted minimum-semester gate
    pub max_semester: u8,
    /// Whether `update_role` notifies members it removes
    pub removal_notice: RemovalNotice,
    /// How concurrent reconciliations for one student and society interact
    pub concurrency: ConcurrencyMode,
    /// Capacity of the side-effect queue
    pub side_effect_queue_capacity: usize,
    /// Per-effect delivery timeout in milliseconds
    pub side_effect_timeout_ms: u64,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With removal notice policy
    #[inline]
    #[must_use]
    pub fn with_removal_notice(mut self, notice: RemovalNotice) -> Self {
        self.removal_notice = notice;
        self
    }

    /// With concurrency mode
    #[inline]
    #[must_use]
    pub fn with_concurrency(mut self, mode: ConcurrencyMode) -> Self {
        self.concurrency = mode;
        self
    }

    /// With side-effect queue capacity
    #[inline]
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.side_effect_queue_capacity = capacity;
        self
    }

    /// With per-effect timeout
    #[inline]
    #[must_use]
    pub fn with_side_effect_timeout(mut self, timeout: Duration) -> Self {
        self.side_effect_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Per-effect timeout as a duration
    #[inline]
    #[must_use]
    pub fn side_effect_timeout(&self) -> Duration {
        Duration::from_millis(self.side_effect_timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            baseline_role_name: "Member".to_string(),
            max_role_name_len: 64,
            max_semester: 12,
            removal_notice: RemovalNotice::Silent,
            concurrency: ConcurrencyMode::SerializePerSubject,
            side_effect_queue_capacity: 1024,
            side_effect_timeout_ms: 5_000,
        }
    }
}

/// Whether members removed from a role by `update_role` are notified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalNotice {
    /// Only newly added members hear about the change
    #[default]
    Silent,
    /// Removed members receive a `Removed` notification
    Notify,
}

/// Coordination between reconciliations of the same student and society
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyMode {
    /// Hold a per-subject lock across read, diff and apply
    #[default]
    SerializePerSubject,
    /// No coordination; the last committed write wins
    LastWriteWins,
}
