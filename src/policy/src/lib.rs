//! # Shield Policy
//!
//! Stores "role may perform action within namespace" bindings and keeps a
//! relation-tuple authorization store in step with them.
//!
//! ## Features
//!
//! - **Canonical policy store** with idempotent create on the
//!   `(role, namespace, action)` triple (in-memory or PostgreSQL)
//! - **Relation tuple sync** projecting each policy to
//!   `namespace:<ns>#<action>@role:<role>` (in-memory or SpiceDB)
//! - **Write-through with idempotent replay**: the policy store is written
//!   first, sync failures are reported with the persisted id and repaired by
//!   retry or [`PolicyService::reconcile`]
//!
//! ## Example
//!
//! ```rust
//! use shield_policy::{
//!     InMemoryPolicyStore, InMemoryRelationStore, PolicyBinding, PolicyFilters, PolicyService,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = PolicyService::new(
//!         Arc::new(InMemoryPolicyStore::new()),
//!         Arc::new(InMemoryRelationStore::new()),
//!     );
//!
//!     let policy = service
//!         .create_policy(PolicyBinding::new("r1", "ns1", "view"))
//!         .await?;
//!
//!     let listed = service.list_policies(&PolicyFilters::namespace("ns1")).await?;
//!     assert_eq!(listed, vec![policy]);
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod service;
pub mod store;
pub mod sync;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use error::{PolicyError, Result};
pub use service::{PolicyService, ReconcileReport, ServiceTimeouts};
pub use store::{InMemoryPolicyStore, PolicyStore, PolicyUpdate};
pub use sync::{AuthzSync, InMemoryRelationStore, RelationStore, RelationTuple, SyncFailure};
pub use types::{ActionId, NamespaceId, Policy, PolicyBinding, PolicyFilters, PolicyId, RoleId};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
