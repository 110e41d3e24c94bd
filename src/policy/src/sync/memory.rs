//! In-memory relation store

use super::{RelationStore, RelationStoreError, RelationTuple};
use async_trait::async_trait;
use dashmap::DashSet;
use std::sync::Arc;

/// Relation store backed by a concurrent set
///
/// Set semantics make `write` and `delete` naturally idempotent.
#[derive(Clone, Default)]
pub struct InMemoryRelationStore {
    tuples: Arc<DashSet<RelationTuple>>,
}

impl InMemoryRelationStore {
    /// Create an empty relation store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tuples
    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    /// Whether no tuples are stored
    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Sorted copy of the stored tuples
    pub fn snapshot(&self) -> Vec<RelationTuple> {
        let mut tuples: Vec<RelationTuple> = self.tuples.iter().map(|t| t.key().clone()).collect();
        tuples.sort();
        tuples
    }

    /// Drop every tuple
    pub fn clear(&self) {
        self.tuples.clear();
    }
}

#[async_trait]
impl RelationStore for InMemoryRelationStore {
    async fn write(&self, tuple: &RelationTuple) -> Result<(), RelationStoreError> {
        self.tuples.insert(tuple.clone());
        Ok(())
    }

    async fn delete(&self, tuple: &RelationTuple) -> Result<(), RelationStoreError> {
        self.tuples.remove(tuple);
        Ok(())
    }

    async fn contains(&self, tuple: &RelationTuple) -> Result<bool, RelationStoreError> {
        Ok(self.tuples.contains(tuple))
    }

    async fn list(
        &self,
        object_type: &str,
        object_id: Option<&str>,
    ) -> Result<Vec<RelationTuple>, RelationStoreError> {
        let mut tuples: Vec<RelationTuple> = self
            .tuples
            .iter()
            .filter(|t| {
                t.object.object_type == object_type
                    && object_id.map_or(true, |id| t.object.object_id == id)
            })
            .map(|t| t.key().clone())
            .collect();
        tuples.sort();
        Ok(tuples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::ObjectRef;
    use crate::types::PolicyBinding;

    #[tokio::test]
    async fn test_write_and_delete_are_idempotent() {
        let store = InMemoryRelationStore::new();
        let tuple = RelationTuple::from_binding(&PolicyBinding::new("r1", "ns1", "view"));

        store.write(&tuple).await.unwrap();
        store.write(&tuple).await.unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.contains(&tuple).await.unwrap());

        store.delete(&tuple).await.unwrap();
        store.delete(&tuple).await.unwrap();
        assert!(store.is_empty());
        assert!(!store.contains(&tuple).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_filters_by_resource() {
        let store = InMemoryRelationStore::new();
        let ns1 = RelationTuple::from_binding(&PolicyBinding::new("r1", "ns1", "view"));
        let ns2 = RelationTuple::from_binding(&PolicyBinding::new("r1", "ns2", "view"));
        let group = RelationTuple::new(
            ObjectRef::new("group", "ns1"),
            "member",
            ObjectRef::new("user", "alice"),
        );
        for tuple in [&ns1, &ns2, &group] {
            store.write(tuple).await.unwrap();
        }

        let all = store.list("namespace", None).await.unwrap();
        assert_eq!(all, vec![ns1.clone(), ns2]);

        let scoped = store.list("namespace", Some("ns1")).await.unwrap();
        assert_eq!(scoped, vec![ns1]);

        assert!(store.list("namespace", Some("ns9")).await.unwrap().is_empty());
    }
}
