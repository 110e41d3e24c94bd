//! Authorization sync: projects policies into the relation tuple store
//!
//! The relation store is a derived, best-effort copy of the policy store.
//! Every write here is idempotent, so a failed batch is repaired by
//! resubmitting the failed entries (or the whole batch).

mod memory;
#[cfg(feature = "spicedb")]
pub mod spicedb;
mod tuple;

pub use memory::InMemoryRelationStore;
#[cfg(feature = "spicedb")]
pub use spicedb::SpiceDbRelationStore;
pub use tuple::{ObjectRef, RelationTuple, NAMESPACE_OBJECT_TYPE, ROLE_SUBJECT_TYPE};

use crate::error::{PolicyError, Result};
use crate::types::{Policy, PolicyFilters, PolicyId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors reported by a relation store backend
#[derive(Debug, Clone, Error)]
pub enum RelationStoreError {
    /// Backend could not be reached or failed internally
    #[error("relation store unavailable: {0}")]
    Unavailable(String),

    /// Backend refused the tuple (malformed for its schema, permission denied)
    #[error("relation store rejected the request: {0}")]
    Rejected(String),
}

impl RelationStoreError {
    /// Whether resubmitting the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Tuple-write contract of the external authorization backend
#[async_trait]
pub trait RelationStore: Send + Sync {
    /// Add a tuple; writing an existing tuple succeeds without duplicating it
    async fn write(&self, tuple: &RelationTuple) -> std::result::Result<(), RelationStoreError>;

    /// Remove a tuple; removing an absent tuple succeeds
    async fn delete(&self, tuple: &RelationTuple) -> std::result::Result<(), RelationStoreError>;

    /// Whether the tuple is currently stored
    async fn contains(
        &self,
        tuple: &RelationTuple,
    ) -> std::result::Result<bool, RelationStoreError>;

    /// Every stored tuple whose resource has `object_type` (and `object_id`, if given)
    async fn list(
        &self,
        object_type: &str,
        object_id: Option<&str>,
    ) -> std::result::Result<Vec<RelationTuple>, RelationStoreError>;
}

/// Direction of a tuple change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TupleOperation {
    /// Tuple added
    Write,
    /// Tuple removed
    Delete,
}

impl fmt::Display for TupleOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Write => write!(f, "write"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// One batch entry that was not applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    /// Policy the tuple was derived from; unset for orphaned tuples
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<PolicyId>,

    /// Tuple that was not applied
    pub tuple: RelationTuple,

    /// Attempted change
    pub operation: TupleOperation,

    /// Backend error text
    pub reason: String,

    /// False when the relation store refused the tuple outright
    pub retryable: bool,
}

impl SyncFailure {
    /// Transient failure entry for `policy`
    pub fn new(policy: &Policy, operation: TupleOperation, reason: impl Into<String>) -> Self {
        Self {
            policy_id: Some(policy.id.clone()),
            tuple: RelationTuple::from_policy(policy),
            operation,
            reason: reason.into(),
            retryable: true,
        }
    }

    fn from_error(
        policy_id: Option<&str>,
        tuple: RelationTuple,
        operation: TupleOperation,
        error: &RelationStoreError,
    ) -> Self {
        Self {
            policy_id: policy_id.map(str::to_string),
            tuple,
            operation,
            reason: error.to_string(),
            retryable: error.is_transient(),
        }
    }
}

/// Sync adapter between the policy store and a [`RelationStore`]
///
/// Batches are applied entry by entry in order. A failed entry does not roll
/// back earlier ones and does not stop later ones; all failures are returned
/// together in [`PolicyError::Sync`].
pub struct AuthzSync<R> {
    relations: Arc<R>,
}

impl<R> Clone for AuthzSync<R> {
    fn clone(&self) -> Self {
        Self {
            relations: Arc::clone(&self.relations),
        }
    }
}

impl<R: RelationStore> AuthzSync<R> {
    /// Create a sync adapter over an injected relation store client
    pub fn new(relations: Arc<R>) -> Self {
        Self { relations }
    }

    /// Underlying relation store
    pub fn relations(&self) -> &Arc<R> {
        &self.relations
    }

    /// Project policies into relation tuples
    pub async fn add(&self, policies: &[Policy]) -> Result<()> {
        self.apply(policies, TupleOperation::Write).await
    }

    /// Remove the relation tuples of policies
    pub async fn remove(&self, policies: &[Policy]) -> Result<()> {
        self.apply(policies, TupleOperation::Delete).await
    }

    /// Delete tuples that have no policy behind them
    pub async fn prune(&self, tuples: &[RelationTuple]) -> Result<()> {
        let mut failures = Vec::new();
        for tuple in tuples {
            if let Err(e) = self.apply_one(None, tuple, TupleOperation::Delete).await {
                failures.push(SyncFailure::from_error(
                    None,
                    tuple.clone(),
                    TupleOperation::Delete,
                    &e,
                ));
            }
        }
        Self::finish(failures)
    }

    /// Resubmit entries from an earlier [`PolicyError::Sync`]
    ///
    /// Entries that fail again are returned the same way.
    pub async fn replay(&self, failures: &[SyncFailure]) -> Result<()> {
        let mut remaining = Vec::new();
        for failure in failures {
            let policy_id = failure.policy_id.as_deref();
            if let Err(e) = self
                .apply_one(policy_id, &failure.tuple, failure.operation)
                .await
            {
                remaining.push(SyncFailure::from_error(
                    policy_id,
                    failure.tuple.clone(),
                    failure.operation,
                    &e,
                ));
            }
        }
        Self::finish(remaining)
    }

    /// Stored tuples of policy shape that fall within `filters`
    pub async fn tuples(
        &self,
        filters: &PolicyFilters,
    ) -> std::result::Result<Vec<RelationTuple>, RelationStoreError> {
        let listed = self
            .relations
            .list(NAMESPACE_OBJECT_TYPE, filters.namespace_id())
            .await?;

        Ok(listed
            .into_iter()
            .filter(|tuple| {
                tuple
                    .binding()
                    .map_or(false, |binding| filters.matches_binding(&binding))
            })
            .collect())
    }

    async fn apply(&self, policies: &[Policy], operation: TupleOperation) -> Result<()> {
        let mut failures = Vec::new();

        for policy in policies {
            let tuple = RelationTuple::from_policy(policy);
            if let Err(e) = self.apply_one(Some(&policy.id), &tuple, operation).await {
                failures.push(SyncFailure::from_error(Some(&policy.id), tuple, operation, &e));
            }
        }

        Self::finish(failures)
    }

    async fn apply_one(
        &self,
        policy_id: Option<&str>,
        tuple: &RelationTuple,
        operation: TupleOperation,
    ) -> std::result::Result<(), RelationStoreError> {
        let outcome = match operation {
            TupleOperation::Write => self.relations.write(tuple).await,
            TupleOperation::Delete => self.relations.delete(tuple).await,
        };

        match &outcome {
            Ok(()) => {
                debug!(?policy_id, %tuple, %operation, "Relation tuple applied");
            }
            Err(e) => {
                warn!(
                    ?policy_id,
                    %tuple,
                    %operation,
                    error = %e,
                    "Relation tuple not applied"
                );
            }
        }

        outcome
    }

    fn finish(failures: Vec<SyncFailure>) -> Result<()> {
        if failures.is_empty() {
            return Ok(());
        }

        let policy_id = failures
            .iter()
            .find_map(|f| f.policy_id.clone())
            .unwrap_or_default();
        Err(PolicyError::Sync {
            policy_id,
            failures,
        })
    }
}
