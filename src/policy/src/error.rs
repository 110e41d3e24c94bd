//! Error types for the policy service

use crate::sync::SyncFailure;
use crate::types::PolicyId;
use thiserror::Error;

/// Policy service errors
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Malformed input, rejected before any store interaction
    #[error("Invalid {field}: {reason}")]
    Validation {
        /// Offending field (`id`, `role_id`, `namespace_id` or `action_id`)
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// Policy not found
    #[error("Policy not found: {0}")]
    NotFound(PolicyId),

    /// Canonical policy store failed (unavailable, constraint violation, deadline)
    #[error("Policy store error: {0}")]
    Store(String),

    /// The policy is durable but its relation tuples were not (all) applied
    #[error("Authorization sync failed for policy {policy_id}: {} relation tuple(s) not applied", .failures.len())]
    Sync {
        /// Policy the failing request persisted
        policy_id: PolicyId,
        /// Entries to retry
        failures: Vec<SyncFailure>,
    },
}

impl PolicyError {
    /// Build a validation error for `field`
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Whether repeating the same call may succeed.
    ///
    /// Persist and sync are both idempotent, so store failures and transient
    /// sync failures are safe to retry as-is. A sync error with any entry the
    /// relation store refused will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(_) => true,
            Self::Sync { failures, .. } => failures.iter().all(|f| f.retryable),
            _ => false,
        }
    }

    /// Id of the already-persisted policy carried by a sync failure
    pub fn policy_id(&self) -> Option<&str> {
        match self {
            Self::Sync { policy_id, .. } => Some(policy_id),
            _ => None,
        }
    }
}

/// Result type for policy operations
pub type Result<T> = std::result::Result<T, PolicyError>;
