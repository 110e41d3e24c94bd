//! Canonical policy storage

use crate::error::Result;
use crate::types::{Policy, PolicyBinding, PolicyFilters};
use async_trait::async_trait;

mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryPolicyStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresPolicyStore;

/// Outcome of [`PolicyStore::update`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyUpdate {
    /// Binding the row held immediately before this write
    pub previous: PolicyBinding,

    /// Row as written
    pub policy: Policy,
}

impl PolicyUpdate {
    /// Whether the write moved the policy to a different binding
    pub fn rebound(&self) -> bool {
        self.previous != self.policy.binding()
    }

    /// The written row as it was bound before the update
    pub fn replaced(&self) -> Policy {
        Policy {
            role_id: self.previous.role_id.clone(),
            namespace_id: self.previous.namespace_id.clone(),
            action_id: self.previous.action_id.clone(),
            ..self.policy.clone()
        }
    }
}

/// Policy store trait
///
/// Implementations own the create-uniqueness invariant: concurrent creates of
/// one binding must yield a single row, and every caller gets that row.
/// Writes return the row as written so callers never need a follow-up read.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Get a policy by ID, `NotFound` if absent
    async fn get(&self, id: &str) -> Result<Policy>;

    /// List policies passing `filters`, ordered by `(created_at, id)`
    async fn list(&self, filters: &PolicyFilters) -> Result<Vec<Policy>>;

    /// Persist a binding, returning the new or already-existing row
    async fn create(&self, binding: &PolicyBinding) -> Result<Policy>;

    /// Point policy `id` at `binding` and refresh `updated_at`.
    ///
    /// The replaced binding is read atomically with the write, so concurrent
    /// updates of one id each see the binding they actually overwrote.
    async fn update(&self, id: &str, binding: &PolicyBinding) -> Result<PolicyUpdate>;

    /// Number of stored policies
    async fn count(&self) -> Result<usize>;
}
