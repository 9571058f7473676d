//! Testing utilities for the Roster workspace
//!
//! Shared fixtures, recording sinks and a store wrapper that fails on demand.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use roster_core::{
    ActivityAction, ActivityEntry, ActivityRecorder, AssignmentStore, EngineConfig, MembershipStore,
    NotificationDispatcher, Privilege, PrivilegeStore, Role, RoleChangeNotice, RoleDiff, RoleId,
    RoleStore, RosterEngine, RosterStores, SocietyId, StoreError, StudentId,
};
use roster_store::InMemoryStore;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Notifier that keeps every notice it receives
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<RoleChangeNotice>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Notifier that records and then reports failure
    pub fn failing() -> Arc<Self> {
        let notifier = Self::default();
        notifier.fail.store(true, Ordering::SeqCst);
        Arc::new(notifier)
    }

    pub fn notices(&self) -> Vec<RoleChangeNotice> {
        self.notices.lock().clone()
    }

    pub fn notices_for(&self, role_id: RoleId) -> Vec<RoleChangeNotice> {
        self.notices().into_iter().filter(|n| n.role_id == role_id).collect()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    async fn notify_role_change(&self, notice: &RoleChangeNotice) -> anyhow::Result<()> {
        self.notices.lock().push(notice.clone());
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("notification gateway unavailable");
        }
        Ok(())
    }
}

/// Recorder that keeps every activity entry it receives
#[derive(Debug, Default)]
pub struct RecordingRecorder {
    entries: Mutex<Vec<ActivityEntry>>,
    fail: AtomicBool,
}

impl RecordingRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let recorder = Self::default();
        recorder.fail.store(true, Ordering::SeqCst);
        Arc::new(recorder)
    }

    pub fn entries(&self) -> Vec<ActivityEntry> {
        self.entries.lock().clone()
    }

    pub fn entries_with(&self, action: ActivityAction) -> Vec<ActivityEntry> {
        self.entries().into_iter().filter(|e| e.action == action).collect()
    }
}

#[async_trait]
impl ActivityRecorder for RecordingRecorder {
    async fn record(&self, entry: &ActivityEntry) -> anyhow::Result<()> {
        self.entries.lock().push(entry.clone());
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("audit log unavailable");
        }
        Ok(())
    }
}

/// Store wrapper whose writes fail while armed
#[derive(Debug)]
pub struct FlakyStore {
    inner: Arc<InMemoryStore>,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_writes: AtomicBool::new(false),
        })
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    /// Make every following write fail until disarmed
    pub fn arm(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn disarm(&self) {
        self.fail_writes.store(false, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AssignmentStore for FlakyStore {
    async fn find_current_roles(
        &self,
        student: StudentId,
        society: SocietyId,
    ) -> Result<BTreeSet<RoleId>, StoreError> {
        self.inner.find_current_roles(student, society).await
    }

    async fn apply_diff(
        &self,
        student: StudentId,
        society: SocietyId,
        diff: &RoleDiff,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.inner.apply_diff(student, society, diff).await
    }
}

#[async_trait]
impl RoleStore for FlakyStore {
    async fn find_role(&self, role_id: RoleId) -> Result<Option<Role>, StoreError> {
        self.inner.find_role(role_id).await
    }

    async fn find_roles_by_society(&self, society: SocietyId) -> Result<Vec<Role>, StoreError> {
        self.inner.find_roles_by_society(society).await
    }

    async fn find_baseline_role(&self, society: SocietyId) -> Result<Option<Role>, StoreError> {
        self.inner.find_baseline_role(society).await
    }

    async fn find_role_members(&self, role_id: RoleId) -> Result<BTreeSet<StudentId>, StoreError> {
        self.inner.find_role_members(role_id).await
    }

    async fn insert_role(&self, role: &Role, members: &BTreeSet<StudentId>) -> Result<(), StoreError> {
        self.check()?;
        self.inner.insert_role(role, members).await
    }

    async fn replace_role(
        &self,
        role: &Role,
        members: Option<BTreeSet<StudentId>>,
    ) -> Result<BTreeSet<StudentId>, StoreError> {
        self.check()?;
        self.inner.replace_role(role, members).await
    }

    async fn delete_role(&self, role_id: RoleId) -> Result<BTreeSet<StudentId>, StoreError> {
        self.check()?;
        self.inner.delete_role(role_id).await
    }
}

#[async_trait]
impl MembershipStore for FlakyStore {
    async fn is_member(&self, student: StudentId, society: SocietyId) -> Result<bool, StoreError> {
        self.inner.is_member(student, society).await
    }

    async fn find_members_of(
        &self,
        society: SocietyId,
        candidates: &BTreeSet<StudentId>,
    ) -> Result<BTreeSet<StudentId>, StoreError> {
        self.inner.find_members_of(society, candidates).await
    }
}

#[async_trait]
impl PrivilegeStore for FlakyStore {
    async fn resolve(&self, keys: &[String]) -> Result<Vec<Privilege>, StoreError> {
        self.inner.resolve(keys).await
    }
}

/// A society with a baseline role, two officer roles and three members
#[derive(Debug, Clone)]
pub struct SeededSociety {
    pub society: SocietyId,
    /// Member who performs administrative changes
    pub president: StudentId,
    /// Regular members, none holding an officer role
    pub members: Vec<StudentId>,
    /// Student with no membership in the society
    pub outsider: StudentId,
    pub baseline: Role,
    pub treasurer: Role,
    pub secretary: Role,
}

impl SeededSociety {
    /// Every member including the president
    pub fn everyone(&self) -> Vec<StudentId> {
        let mut all = vec![self.president];
        all.extend(self.members.iter().copied());
        all
    }
}

/// Seed a society into the store; every member holds the baseline role
pub async fn seed_society(store: &InMemoryStore) -> SeededSociety {
    let society = SocietyId::new();
    let president = StudentId::new();
    let members: Vec<StudentId> = (0..3).map(|_| StudentId::new()).collect();

    store.add_membership(president, society);
    for member in &members {
        store.add_membership(*member, society);
    }

    let baseline = Role::baseline(society, "Member");
    let treasurer = Role::new(society, "Treasurer").with_privileges(["payment_handling"]);
    let secretary = Role::new(society, "Secretary")
        .with_privileges(["meeting_management", "announcement_management"]);

    let everyone: BTreeSet<StudentId> = std::iter::once(president).chain(members.iter().copied()).collect();
    store.insert_role(&baseline, &everyone).await.unwrap();
    store.insert_role(&treasurer, &BTreeSet::new()).await.unwrap();
    store.insert_role(&secretary, &BTreeSet::new()).await.unwrap();

    SeededSociety {
        society,
        president,
        members,
        outsider: StudentId::new(),
        baseline,
        treasurer,
        secretary,
    }
}

/// Engine wired to recording sinks
pub struct TestEngine {
    pub engine: RosterEngine,
    pub notifier: Arc<RecordingNotifier>,
    pub recorder: Arc<RecordingRecorder>,
}

impl TestEngine {
    /// Drain side effects so the sinks can be inspected
    pub async fn settle(&self) {
        self.engine.shutdown().await;
    }
}

pub fn setup_test_engine(config: EngineConfig, stores: RosterStores) -> TestEngine {
    setup_test_engine_with(config, stores, RecordingNotifier::new(), RecordingRecorder::new())
}

pub fn setup_test_engine_with(
    config: EngineConfig,
    stores: RosterStores,
    notifier: Arc<RecordingNotifier>,
    recorder: Arc<RecordingRecorder>,
) -> TestEngine {
    let engine = RosterEngine::new(config, stores, notifier.clone(), recorder.clone());
    TestEngine {
        engine,
        notifier,
        recorder,
    }
}

/// Fresh store, seeded society and engine with default config
pub async fn setup_seeded() -> (Arc<InMemoryStore>, SeededSociety, TestEngine) {
    let store = Arc::new(InMemoryStore::with_default_privileges());
    let seeded = seed_society(&store).await;
    let engine = setup_test_engine(EngineConfig::new(), RosterStores::shared(Arc::clone(&store)));
    (store, seeded, engine)
}
