//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use dashmap::DashSet;
use shield_policy::store::{PolicyStore, PolicyUpdate};
use shield_policy::sync::RelationStoreError;
use shield_policy::{
    InMemoryPolicyStore, InMemoryRelationStore, Policy, PolicyBinding, PolicyFilters,
    PolicyService, RelationStore, RelationTuple, Result,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// Relation store that fails selected tuples, or everything while offline
#[derive(Clone, Default)]
pub struct FlakyRelationStore {
    inner: InMemoryRelationStore,
    failing: Arc<DashSet<String>>,
    refused: Arc<DashSet<String>>,
    offline: Arc<AtomicBool>,
}

impl FlakyRelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every write/delete of `binding`'s tuple as unavailable
    pub fn fail_on(&self, binding: &PolicyBinding) {
        self.failing
            .insert(RelationTuple::from_binding(binding).to_string());
    }

    /// Refuse every write/delete of `binding`'s tuple outright
    pub fn reject(&self, binding: &PolicyBinding) {
        self.refused
            .insert(RelationTuple::from_binding(binding).to_string());
    }

    /// Stop failing `binding`'s tuple
    pub fn heal(&self, binding: &PolicyBinding) {
        let key = RelationTuple::from_binding(binding).to_string();
        self.failing.remove(&key);
        self.refused.remove(&key);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &InMemoryRelationStore {
        &self.inner
    }

    fn check(&self, tuple: &RelationTuple) -> std::result::Result<(), RelationStoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RelationStoreError::Unavailable("connection refused".to_string()));
        }
        if self.failing.contains(&tuple.to_string()) {
            return Err(RelationStoreError::Unavailable(format!("{} timed out", tuple)));
        }
        if self.refused.contains(&tuple.to_string()) {
            return Err(RelationStoreError::Rejected(format!("{} refused", tuple)));
        }
        Ok(())
    }
}

#[async_trait]
impl RelationStore for FlakyRelationStore {
    async fn write(&self, tuple: &RelationTuple) -> std::result::Result<(), RelationStoreError> {
        self.check(tuple)?;
        self.inner.write(tuple).await
    }

    async fn delete(&self, tuple: &RelationTuple) -> std::result::Result<(), RelationStoreError> {
        self.check(tuple)?;
        self.inner.delete(tuple).await
    }

    async fn contains(
        &self,
        tuple: &RelationTuple,
    ) -> std::result::Result<bool, RelationStoreError> {
        self.inner.contains(tuple).await
    }

    async fn list(
        &self,
        object_type: &str,
        object_id: Option<&str>,
    ) -> std::result::Result<Vec<RelationTuple>, RelationStoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RelationStoreError::Unavailable("connection refused".to_string()));
        }
        self.inner.list(object_type, object_id).await
    }
}

/// Relation store that never answers within a test deadline
#[derive(Clone, Default)]
pub struct StalledRelationStore;

#[async_trait]
impl RelationStore for StalledRelationStore {
    async fn write(&self, _tuple: &RelationTuple) -> std::result::Result<(), RelationStoreError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }

    async fn delete(&self, _tuple: &RelationTuple) -> std::result::Result<(), RelationStoreError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }

    async fn contains(
        &self,
        _tuple: &RelationTuple,
    ) -> std::result::Result<bool, RelationStoreError> {
        Ok(false)
    }

    async fn list(
        &self,
        _object_type: &str,
        _object_id: Option<&str>,
    ) -> std::result::Result<Vec<RelationTuple>, RelationStoreError> {
        Ok(Vec::new())
    }
}

/// Policy store that delays every call
#[derive(Clone)]
pub struct SlowPolicyStore {
    inner: InMemoryPolicyStore,
    delay: Duration,
}

impl SlowPolicyStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: InMemoryPolicyStore::new(),
            delay,
        }
    }

    pub fn inner(&self) -> &InMemoryPolicyStore {
        &self.inner
    }
}

#[async_trait]
impl PolicyStore for SlowPolicyStore {
    async fn get(&self, id: &str) -> Result<Policy> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(id).await
    }

    async fn list(&self, filters: &PolicyFilters) -> Result<Vec<Policy>> {
        tokio::time::sleep(self.delay).await;
        self.inner.list(filters).await
    }

    async fn create(&self, binding: &PolicyBinding) -> Result<Policy> {
        tokio::time::sleep(self.delay).await;
        self.inner.create(binding).await
    }

    async fn update(&self, id: &str, binding: &PolicyBinding) -> Result<PolicyUpdate> {
        tokio::time::sleep(self.delay).await;
        self.inner.update(id, binding).await
    }

    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }
}

type Gate = (oneshot::Sender<()>, oneshot::Receiver<()>);

/// Policy store that can park an update before it touches the row
#[derive(Clone, Default)]
pub struct GatedPolicyStore {
    inner: InMemoryPolicyStore,
    gate: Arc<Mutex<Option<Gate>>>,
}

impl GatedPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park the next update on entry.
    ///
    /// The first receiver fires once the update is parked; sending on the
    /// returned sender lets it proceed.
    pub fn hold_next_update(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *self.gate.lock().unwrap() = Some((entered_tx, release_rx));
        (entered_rx, release_tx)
    }
}

#[async_trait]
impl PolicyStore for GatedPolicyStore {
    async fn get(&self, id: &str) -> Result<Policy> {
        self.inner.get(id).await
    }

    async fn list(&self, filters: &PolicyFilters) -> Result<Vec<Policy>> {
        self.inner.list(filters).await
    }

    async fn create(&self, binding: &PolicyBinding) -> Result<Policy> {
        self.inner.create(binding).await
    }

    async fn update(&self, id: &str, binding: &PolicyBinding) -> Result<PolicyUpdate> {
        let gate = self.gate.lock().unwrap().take();
        if let Some((entered, release)) = gate {
            let _ = entered.send(());
            let _ = release.await;
        }
        self.inner.update(id, binding).await
    }

    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }
}

pub fn memory_service() -> PolicyService<InMemoryPolicyStore, InMemoryRelationStore> {
    PolicyService::new(
        Arc::new(InMemoryPolicyStore::new()),
        Arc::new(InMemoryRelationStore::new()),
    )
}

pub fn flaky_service() -> (
    PolicyService<InMemoryPolicyStore, FlakyRelationStore>,
    FlakyRelationStore,
) {
    let relations = FlakyRelationStore::new();
    let service = PolicyService::new(
        Arc::new(InMemoryPolicyStore::new()),
        Arc::new(relations.clone()),
    );
    (service, relations)
}

pub fn tuple(role: &str, namespace: &str, action: &str) -> RelationTuple {
    RelationTuple::from_binding(&PolicyBinding::new(role, namespace, action))
}
