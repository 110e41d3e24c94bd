//! In-memory policy store

use crate::error::{PolicyError, Result};
use crate::store::{PolicyStore, PolicyUpdate};
use crate::types::{Policy, PolicyBinding, PolicyFilters, PolicyId};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    rows: HashMap<PolicyId, Policy>,
    /// Unique index on the binding triple
    by_binding: HashMap<PolicyBinding, PolicyId>,
}

/// In-memory policy store implementation
///
/// One lock guards both the rows and the binding index, so every mutation is
/// a single critical section and cannot be observed half-applied.
#[derive(Clone, Default)]
pub struct InMemoryPolicyStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryPolicyStore {
    /// Create a new in-memory policy store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn get(&self, id: &str) -> Result<Policy> {
        let tables = self.tables.read().await;
        tables
            .rows
            .get(id)
            .cloned()
            .ok_or_else(|| PolicyError::NotFound(id.to_string()))
    }

    async fn list(&self, filters: &PolicyFilters) -> Result<Vec<Policy>> {
        let tables = self.tables.read().await;
        let mut policies: Vec<Policy> = tables
            .rows
            .values()
            .filter(|p| filters.matches(p))
            .cloned()
            .collect();

        policies.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));

        Ok(policies)
    }

    async fn create(&self, binding: &PolicyBinding) -> Result<Policy> {
        let mut tables = self.tables.write().await;

        if let Some(existing) = tables.by_binding.get(binding) {
            debug!(policy_id = %existing, %binding, "Binding already stored");
            return tables.rows.get(existing).cloned().ok_or_else(|| {
                PolicyError::Store(format!("binding index points at missing policy {}", existing))
            });
        }

        let now = Utc::now();
        let policy = Policy {
            id: Uuid::new_v4().to_string(),
            role_id: binding.role_id.clone(),
            namespace_id: binding.namespace_id.clone(),
            action_id: binding.action_id.clone(),
            created_at: now,
            updated_at: now,
        };

        tables.by_binding.insert(binding.clone(), policy.id.clone());
        tables.rows.insert(policy.id.clone(), policy.clone());

        Ok(policy)
    }

    async fn update(&self, id: &str, binding: &PolicyBinding) -> Result<PolicyUpdate> {
        let mut tables = self.tables.write().await;

        let previous = tables
            .rows
            .get(id)
            .map(Policy::binding)
            .ok_or_else(|| PolicyError::NotFound(id.to_string()))?;

        if let Some(owner) = tables.by_binding.get(binding) {
            if owner != id {
                return Err(PolicyError::Store(format!(
                    "binding {} is already stored as policy {}",
                    binding, owner
                )));
            }
        }

        tables.by_binding.remove(&previous);
        tables.by_binding.insert(binding.clone(), id.to_string());

        let row = tables
            .rows
            .get_mut(id)
            .ok_or_else(|| PolicyError::NotFound(id.to_string()))?;
        row.role_id = binding.role_id.clone();
        row.namespace_id = binding.namespace_id.clone();
        row.action_id = binding.action_id.clone();
        // updated_at is strictly increasing per row
        row.updated_at = Utc::now().max(row.updated_at + Duration::microseconds(1));

        Ok(PolicyUpdate {
            previous,
            policy: row.clone(),
        })
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.tables.read().await.rows.len())
    }
}
