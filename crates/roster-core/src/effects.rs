//! Detached side effects: role-change notifications and activity entries
//!
//! The engine publishes [`SideEffect`] messages after a write commits and
//! never waits for them. A single worker task drains the queue and calls the
//! external sinks; sink failures, panics and timeouts are logged and counted,
//! never reported back to the operation that produced them.

use crate::types::{RoleId, SocietyId, StudentId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Direction of a role change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Members gained the role
    Added,
    /// Members lost the role
    Removed,
}

/// Notification that members gained or lost a role
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleChangeNotice {
    /// Affected role
    pub role_id: RoleId,
    /// Society scope
    pub society_id: SocietyId,
    /// Students to notify
    pub member_ids: BTreeSet<StudentId>,
    /// Gained or lost
    pub kind: ChangeKind,
}

/// What an activity entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    RoleCreated,
    RoleUpdated,
    RoleDeleted,
    StudentRolesChanged,
}

/// Kind of entity an activity entry points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Role,
    Student,
}

/// Coarse nature of the recorded change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityNature {
    Creation,
    Modification,
    Deletion,
}

/// Audit trail entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityEntry {
    /// Who performed the change
    pub actor_id: StudentId,
    /// Society scope
    pub society_id: SocietyId,
    /// What happened
    pub action: ActivityAction,
    /// Human-readable description
    pub description: String,
    /// ID of the affected entity
    pub target_id: String,
    /// Kind of the affected entity
    pub target_type: TargetType,
    /// Creation, modification or deletion
    pub nature: ActivityNature,
    /// When the change committed
    pub recorded_at: DateTime<Utc>,
}

impl ActivityEntry {
    /// Entry about a role
    #[must_use]
    pub fn for_role(
        actor_id: StudentId,
        society_id: SocietyId,
        role_id: RoleId,
        action: ActivityAction,
        nature: ActivityNature,
        description: impl Into<String>,
    ) -> Self {
        Self {
            actor_id,
            society_id,
            action,
            description: description.into(),
            target_id: role_id.to_string(),
            target_type: TargetType::Role,
            nature,
            recorded_at: Utc::now(),
        }
    }

    /// Entry about a student
    #[must_use]
    pub fn for_student(
        actor_id: StudentId,
        society_id: SocietyId,
        student_id: StudentId,
        description: impl Into<String>,
    ) -> Self {
        Self {
            actor_id,
            society_id,
            action: ActivityAction::StudentRolesChanged,
            description: description.into(),
            target_id: student_id.to_string(),
            target_type: TargetType::Student,
            nature: ActivityNature::Modification,
            recorded_at: Utc::now(),
        }
    }
}

/// Delivers role-change notifications (email, push, ...)
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Deliver one notice
    async fn notify_role_change(&self, notice: &RoleChangeNotice) -> anyhow::Result<()>;
}

/// Appends to the audit trail
#[async_trait]
pub trait ActivityRecorder: Send + Sync {
    /// Append one entry
    async fn record(&self, entry: &ActivityEntry) -> anyhow::Result<()>;
}

/// Notifier that only writes to the trace log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationDispatcher for LogNotifier {
    async fn notify_role_change(&self, notice: &RoleChangeNotice) -> anyhow::Result<()> {
        tracing::info!(
            role_id = %notice.role_id,
            society_id = %notice.society_id,
            kind = ?notice.kind,
            members = notice.member_ids.len(),
            "role change notification"
        );
        Ok(())
    }
}

/// Activity recorder that only writes to the trace log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogActivityRecorder;

#[async_trait]
impl ActivityRecorder for LogActivityRecorder {
    async fn record(&self, entry: &ActivityEntry) -> anyhow::Result<()> {
        tracing::info!(
            actor_id = %entry.actor_id,
            society_id = %entry.society_id,
            action = ?entry.action,
            target = %entry.target_id,
            "{}",
            entry.description
        );
        Ok(())
    }
}

/// Messages sent to the dispatch worker
#[derive(Debug, Clone)]
pub enum SideEffect {
    /// Deliver a notification
    Notify(RoleChangeNotice),
    /// Append an activity entry
    Record(ActivityEntry),
    /// Stop after draining everything queued before this message
    Shutdown,
}

/// Dispatch statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Effects accepted into the queue
    pub published: u64,
    /// Effects the sinks completed
    pub delivered: u64,
    /// Effects whose sink failed, panicked or timed out
    pub failed: u64,
    /// Effects rejected because the queue was full or closed
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Fire-and-forget publisher backed by one worker task
pub struct SideEffectDispatcher {
    sender: mpsc::Sender<SideEffect>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for SideEffectDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SideEffectDispatcher")
            .field("stats", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}

impl SideEffectDispatcher {
    /// Spawn the worker task.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(
        notifier: Arc<dyn NotificationDispatcher>,
        recorder: Arc<dyn ActivityRecorder>,
        capacity: usize,
        timeout: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(Counters::default());
        let worker = tokio::spawn(dispatch_loop(
            rx,
            notifier,
            recorder,
            timeout,
            Arc::clone(&counters),
        ));

        Self {
            sender: tx,
            worker: Mutex::new(Some(worker)),
            counters,
        }
    }

    /// Queue an effect without waiting.
    ///
    /// Returns `false` when the effect was dropped.
    pub fn publish(&self, effect: SideEffect) -> bool {
        match self.sender.try_send(effect) {
            Ok(()) => {
                self.counters.published.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(effect)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(effect = ?effect, "side-effect queue full, dropping");
                false
            }
            Err(mpsc::error::TrySendError::Closed(effect)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(effect = ?effect, "side-effect queue closed, dropping");
                false
            }
        }
    }

    /// Queue a notification unless it has no recipients
    pub fn notify(&self, notice: RoleChangeNotice) {
        if !notice.member_ids.is_empty() {
            self.publish(SideEffect::Notify(notice));
        }
    }

    /// Queue an activity entry
    pub fn record(&self, entry: ActivityEntry) {
        self.publish(SideEffect::Record(entry));
    }

    /// Drain queued effects and stop the worker.
    ///
    /// Later calls are no-ops; effects published afterwards are dropped.
    pub async fn shutdown(&self) {
        let Some(worker) = self.worker.lock().await.take() else {
            return;
        };
        if self.sender.send(SideEffect::Shutdown).await.is_err() {
            tracing::debug!("side-effect worker already stopped");
        }
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "side-effect worker terminated abnormally");
        }
    }

    /// Get dispatch statistics
    #[inline]
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }
}

/// Worker loop (runs in separate tokio task)
async fn dispatch_loop(
    mut rx: mpsc::Receiver<SideEffect>,
    notifier: Arc<dyn NotificationDispatcher>,
    recorder: Arc<dyn ActivityRecorder>,
    timeout: Duration,
    counters: Arc<Counters>,
) {
    while let Some(effect) = rx.recv().await {
        let (kind, task) = match effect {
            SideEffect::Notify(notice) => {
                let notifier = Arc::clone(&notifier);
                (
                    "notification",
                    tokio::spawn(async move { notifier.notify_role_change(&notice).await }),
                )
            }
            SideEffect::Record(entry) => {
                let recorder = Arc::clone(&recorder);
                (
                    "activity",
                    tokio::spawn(async move { recorder.record(&entry).await }),
                )
            }
            SideEffect::Shutdown => break,
        };

        // A panicking sink must not stop the worker.
        let abort = task.abort_handle();
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(()))) => {
                counters.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Ok(Err(e))) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(kind, error = %e, "side effect failed");
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(kind, error = %e, "side effect panicked");
            }
            Err(_) => {
                abort.abort();
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(kind, ?timeout, "side effect timed out");
            }
        }
    }
}
