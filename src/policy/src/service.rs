//! Policy service: validate → persist → sync
//!
//! The policy store is the source of truth and is always written first. A
//! sync failure is reported to the caller but never rolls the store back; the
//! relation store catches up on retry or on the next [`PolicyService::reconcile`].

use crate::error::{PolicyError, Result};
use crate::store::PolicyStore;
use crate::sync::{AuthzSync, RelationStore, RelationTuple, SyncFailure, TupleOperation};
use crate::types::{Policy, PolicyBinding, PolicyFilters};
use crate::validation::{validate_binding, validate_policy_id};
use futures::future::join;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::slice;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Policies pushed per reconcile step
pub const RECONCILE_BATCH_SIZE: usize = 100;

/// Deadlines applied to each store and sync round-trip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceTimeouts {
    /// Per policy store call
    pub store: Duration,

    /// Per sync batch
    pub sync: Duration,
}

impl Default for ServiceTimeouts {
    fn default() -> Self {
        Self {
            store: Duration::from_secs(5),
            sync: Duration::from_secs(5),
        }
    }
}

/// Outcome of a reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Policies read from the store
    pub policies: usize,

    /// Policies whose tuple was written
    pub applied: usize,

    /// Orphaned tuples deleted
    pub pruned: usize,

    /// Entries still to retry
    pub failures: Vec<SyncFailure>,

    /// Set when the relation store could not be listed, so nothing was pruned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prune_error: Option<String>,
}

impl ReconcileReport {
    /// True when every policy was propagated and every orphan removed
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.prune_error.is_none()
    }
}

/// Entry point for transport adapters
///
/// Generic over both backends. Holds no mutable state of its own, so clones
/// are cheap and instances scale horizontally.
pub struct PolicyService<S, R> {
    store: Arc<S>,
    sync: AuthzSync<R>,
    timeouts: ServiceTimeouts,
}

impl<S, R> Clone for PolicyService<S, R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            sync: self.sync.clone(),
            timeouts: self.timeouts,
        }
    }
}

impl<S: PolicyStore, R: RelationStore> PolicyService<S, R> {
    /// Create a service over a policy store and a relation store client
    pub fn new(store: Arc<S>, relations: Arc<R>) -> Self {
        Self {
            store,
            sync: AuthzSync::new(relations),
            timeouts: ServiceTimeouts::default(),
        }
    }

    /// Override the default deadlines
    pub fn with_timeouts(mut self, timeouts: ServiceTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Canonical store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Sync adapter
    pub fn sync(&self) -> &AuthzSync<R> {
        &self.sync
    }

    /// Configured deadlines
    pub fn timeouts(&self) -> ServiceTimeouts {
        self.timeouts
    }

    /// Create a policy, or return the existing one for the same binding
    pub async fn create_policy(&self, binding: PolicyBinding) -> Result<Policy> {
        validate_binding(&binding)?;

        let policy = self.persist(self.store.create(&binding)).await?;
        info!(policy_id = %policy.id, %binding, "Policy persisted");

        self.propagate(&policy.id, slice::from_ref(&policy), TupleOperation::Write)
            .await?;

        Ok(policy)
    }

    /// Point an existing policy at a new binding
    ///
    /// When the binding changes, the old tuple is deleted and the new one
    /// written. Both are attempted even if one fails; the error lists every
    /// entry that was not applied.
    pub async fn update_policy(&self, id: &str, binding: PolicyBinding) -> Result<Policy> {
        validate_policy_id(id)?;
        validate_binding(&binding)?;

        let change = self.persist(self.store.update(id, &binding)).await?;
        let policy = change.policy.clone();
        info!(
            policy_id = %policy.id,
            previous = %change.previous,
            binding = %binding,
            "Policy updated"
        );

        let mut failures = Vec::new();
        let written = self.propagate(&policy.id, slice::from_ref(&policy), TupleOperation::Write);
        if change.rebound() {
            // Distinct tuples, so the delete and the write can run together
            let replaced = change.replaced();
            let removed =
                self.propagate(&policy.id, slice::from_ref(&replaced), TupleOperation::Delete);
            let (removed, written) = join(removed, written).await;
            collect(removed, &mut failures)?;
            collect(written, &mut failures)?;
        } else {
            collect(written.await, &mut failures)?;
        }

        if failures.is_empty() {
            Ok(policy)
        } else {
            Err(PolicyError::Sync {
                policy_id: policy.id,
                failures,
            })
        }
    }

    /// Get a policy by id
    pub async fn get_policy(&self, id: &str) -> Result<Policy> {
        validate_policy_id(id)?;
        self.persist(self.store.get(id)).await
    }

    /// List policies passing `filters`
    pub async fn list_policies(&self, filters: &PolicyFilters) -> Result<Vec<Policy>> {
        self.persist(self.store.list(filters)).await
    }

    /// Bring the relation store in line with the (filtered) policy store.
    ///
    /// Every stored policy's tuple is re-written, then policy-shaped tuples
    /// that no stored policy projects to are deleted. Idempotent and safe to
    /// run next to live traffic. Sync failures end up in the report rather
    /// than as an error.
    pub async fn reconcile(&self, filters: &PolicyFilters) -> Result<ReconcileReport> {
        // Tuples are listed before policies: a policy created in between is
        // either in the policy listing or its tuple is absent from this one.
        let listed = self.list_tuples(filters).await;

        let policies = self.persist(self.store.list(filters)).await?;
        let mut report = ReconcileReport {
            policies: policies.len(),
            ..ReconcileReport::default()
        };

        for batch in policies.chunks(RECONCILE_BATCH_SIZE) {
            let mut failures = Vec::new();
            collect(
                self.propagate(&batch[0].id, batch, TupleOperation::Write).await,
                &mut failures,
            )?;
            report.applied += batch.len() - failures.len();
            report.failures.extend(failures);
        }

        match listed {
            Ok(tuples) => {
                let projected: HashSet<RelationTuple> =
                    policies.iter().map(RelationTuple::from_policy).collect();
                let orphans: Vec<RelationTuple> = tuples
                    .into_iter()
                    .filter(|tuple| !projected.contains(tuple))
                    .collect();
                if !orphans.is_empty() {
                    self.prune(filters, &orphans, &mut report).await?;
                }
            }
            Err(reason) => {
                warn!(error = %reason, "Relation store not listed, skipping prune");
                report.prune_error = Some(reason);
            }
        }

        if report.is_clean() {
            info!(
                policies = report.policies,
                pruned = report.pruned,
                "Reconciliation complete"
            );
        } else {
            warn!(
                policies = report.policies,
                failed = report.failures.len(),
                "Reconciliation left the relation store out of sync"
            );
        }

        Ok(report)
    }

    async fn list_tuples(
        &self,
        filters: &PolicyFilters,
    ) -> std::result::Result<Vec<RelationTuple>, String> {
        match timeout(self.timeouts.sync, self.sync.tuples(filters)).await {
            Ok(Ok(tuples)) => Ok(tuples),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "relation store listing deadline of {:?} exceeded",
                self.timeouts.sync
            )),
        }
    }

    /// Delete orphaned tuples, then restore any a concurrent write made live again
    async fn prune(
        &self,
        filters: &PolicyFilters,
        orphans: &[RelationTuple],
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let mut failures = Vec::new();
        match timeout(self.timeouts.sync, self.sync.prune(orphans)).await {
            Ok(result) => collect(result, &mut failures)?,
            Err(_) => {
                warn!(orphans = orphans.len(), "Prune deadline exceeded");
                let reason = format!("sync deadline of {:?} exceeded", self.timeouts.sync);
                failures.extend(orphans.iter().map(|tuple| SyncFailure {
                    policy_id: None,
                    tuple: tuple.clone(),
                    operation: TupleOperation::Delete,
                    reason: reason.clone(),
                    retryable: true,
                }));
            }
        }
        report.pruned += orphans.len() - failures.len();
        report.failures.extend(failures);
        debug!(pruned = report.pruned, "Orphaned tuples deleted");

        // A policy created or rebound onto a pruned tuple after the listing
        let pruned: HashSet<&RelationTuple> = orphans.iter().collect();
        let revived: Vec<Policy> = self
            .persist(self.store.list(filters))
            .await?
            .into_iter()
            .filter(|policy| pruned.contains(&RelationTuple::from_policy(policy)))
            .collect();
        for policy in &revived {
            let mut failures = Vec::new();
            collect(
                self.propagate(&policy.id, slice::from_ref(policy), TupleOperation::Write)
                    .await,
                &mut failures,
            )?;
            report.failures.extend(failures);
        }

        Ok(())
    }

    /// Run a store call under the store deadline
    async fn persist<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        match timeout(self.timeouts.store, op).await {
            Ok(result) => result,
            Err(_) => Err(PolicyError::Store(format!(
                "policy store deadline of {:?} exceeded",
                self.timeouts.store
            ))),
        }
    }

    /// Run a sync batch under the sync deadline, attributing failures to `policy_id`
    async fn propagate(
        &self,
        policy_id: &str,
        batch: &[Policy],
        operation: TupleOperation,
    ) -> Result<()> {
        let op = async {
            match operation {
                TupleOperation::Write => self.sync.add(batch).await,
                TupleOperation::Delete => self.sync.remove(batch).await,
            }
        };

        match timeout(self.timeouts.sync, op).await {
            Ok(Ok(())) => {
                debug!(policy_id, %operation, entries = batch.len(), "Sync batch applied");
                Ok(())
            }
            Ok(Err(PolicyError::Sync { failures, .. })) => {
                warn!(
                    policy_id,
                    %operation,
                    failed = failures.len(),
                    "Policy persisted but not fully propagated"
                );
                Err(PolicyError::Sync {
                    policy_id: policy_id.to_string(),
                    failures,
                })
            }
            Ok(Err(other)) => Err(other),
            Err(_) => {
                // Unknown which entries landed; all of them are safe to resend
                warn!(
                    policy_id,
                    %operation,
                    deadline = ?self.timeouts.sync,
                    "Sync deadline exceeded"
                );
                let reason = format!("sync deadline of {:?} exceeded", self.timeouts.sync);
                Err(PolicyError::Sync {
                    policy_id: policy_id.to_string(),
                    failures: batch
                        .iter()
                        .map(|p| SyncFailure::new(p, operation, reason.clone()))
                        .collect(),
                })
            }
        }
    }
}

/// Move sync failures into `failures`, pass every other outcome through
fn collect(result: Result<()>, failures: &mut Vec<SyncFailure>) -> Result<()> {
    match result {
        Err(PolicyError::Sync { failures: failed, .. }) => {
            failures.extend(failed);
            Ok(())
        }
        other => other,
    }
}
