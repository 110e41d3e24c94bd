//! Core policy types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique policy identifier, assigned by the store
pub type PolicyId = String;

/// Role identifier (owned by the role registry)
pub type RoleId = String;

/// Namespace identifier (owned by the namespace registry)
pub type NamespaceId = String;

/// Action identifier (owned by the action registry)
pub type ActionId = String;

/// The `(role, namespace, action)` triple a policy grants.
///
/// This is the semantic key of a policy: two policies with the same binding
/// are the same grant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyBinding {
    /// Role receiving the grant
    pub role_id: RoleId,

    /// Namespace the grant is scoped to
    pub namespace_id: NamespaceId,

    /// Action being granted
    pub action_id: ActionId,
}

impl PolicyBinding {
    /// Create a new binding
    pub fn new(
        role_id: impl Into<String>,
        namespace_id: impl Into<String>,
        action_id: impl Into<String>,
    ) -> Self {
        Self {
            role_id: role_id.into(),
            namespace_id: namespace_id.into(),
            action_id: action_id.into(),
        }
    }
}

impl fmt::Display for PolicyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {})",
            self.role_id, self.namespace_id, self.action_id
        )
    }
}

/// A stored grant: a Role may perform an Action within a Namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Store-assigned identifier, stable across updates
    pub id: PolicyId,

    /// Role receiving the grant
    pub role_id: RoleId,

    /// Namespace the grant is scoped to
    pub namespace_id: NamespaceId,

    /// Action being granted
    pub action_id: ActionId,

    /// Set by the store on creation
    pub created_at: DateTime<Utc>,

    /// Refreshed by the store on every update
    pub updated_at: DateTime<Utc>,
}

impl Policy {
    /// The semantic key of this policy
    pub fn binding(&self) -> PolicyBinding {
        PolicyBinding {
            role_id: self.role_id.clone(),
            namespace_id: self.namespace_id.clone(),
            action_id: self.action_id.clone(),
        }
    }
}

/// Query-time projection over stored policies.
///
/// Every populated field must match. Unset and empty-string fields match
/// everything, so `PolicyFilters::default()` lists all policies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyFilters {
    /// Only policies scoped to this namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_id: Option<NamespaceId>,

    /// Only policies granted to this role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<RoleId>,

    /// Only policies granting this action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<ActionId>,
}

impl PolicyFilters {
    /// Filter matching every policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter scoped to one namespace
    pub fn namespace(namespace_id: impl Into<String>) -> Self {
        Self {
            namespace_id: Some(namespace_id.into()),
            ..Self::default()
        }
    }

    /// Restrict to one role
    pub fn with_role(mut self, role_id: impl Into<String>) -> Self {
        self.role_id = Some(role_id.into());
        self
    }

    /// Restrict to one action
    pub fn with_action(mut self, action_id: impl Into<String>) -> Self {
        self.action_id = Some(action_id.into());
        self
    }

    /// Namespace criterion, if any
    pub fn namespace_id(&self) -> Option<&str> {
        criterion(&self.namespace_id)
    }

    /// Role criterion, if any
    pub fn role_id(&self) -> Option<&str> {
        criterion(&self.role_id)
    }

    /// Action criterion, if any
    pub fn action_id(&self) -> Option<&str> {
        criterion(&self.action_id)
    }

    /// True when the filter matches every policy
    pub fn is_empty(&self) -> bool {
        self.namespace_id().is_none() && self.role_id().is_none() && self.action_id().is_none()
    }

    /// Check whether `policy` passes this filter
    pub fn matches(&self, policy: &Policy) -> bool {
        self.matches_parts(&policy.role_id, &policy.namespace_id, &policy.action_id)
    }

    /// Check whether `binding` passes this filter
    pub fn matches_binding(&self, binding: &PolicyBinding) -> bool {
        self.matches_parts(&binding.role_id, &binding.namespace_id, &binding.action_id)
    }

    fn matches_parts(&self, role_id: &str, namespace_id: &str, action_id: &str) -> bool {
        self.namespace_id().map_or(true, |ns| ns == namespace_id)
            && self.role_id().map_or(true, |role| role == role_id)
            && self.action_id().map_or(true, |action| action == action_id)
    }
}

fn criterion(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(role: &str, namespace: &str, action: &str) -> Policy {
        let now = Utc::now();
        Policy {
            id: format!("{}-{}-{}", role, namespace, action),
            role_id: role.to_string(),
            namespace_id: namespace.to_string(),
            action_id: action.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_binding_roundtrip() {
        let p = policy("r1", "ns1", "view");
        assert_eq!(p.binding(), PolicyBinding::new("r1", "ns1", "view"));
        assert_eq!(p.binding().to_string(), "(r1, ns1, view)");
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filters = PolicyFilters::default();
        assert!(filters.is_empty());
        assert!(filters.matches(&policy("r1", "ns1", "view")));

        // Empty strings behave like unset fields
        let blank = PolicyFilters::namespace("");
        assert!(blank.is_empty());
        assert!(blank.matches(&policy("r1", "ns2", "edit")));
    }

    #[test]
    fn test_filter_fields_combine() {
        let filters = PolicyFilters::namespace("ns1").with_role("r1");
        assert!(filters.matches(&policy("r1", "ns1", "view")));
        assert!(!filters.matches(&policy("r2", "ns1", "view")));
        assert!(!filters.matches(&policy("r1", "ns2", "view")));

        let by_action = PolicyFilters::new().with_action("edit");
        assert!(by_action.matches(&policy("r9", "ns9", "edit")));
        assert!(!by_action.matches(&policy("r9", "ns9", "view")));
        assert!(by_action.matches_binding(&PolicyBinding::new("r9", "ns9", "edit")));
        assert!(!by_action.matches_binding(&PolicyBinding::new("r9", "ns9", "view")));
    }

    #[test]
    fn test_filters_deserialize_from_partial_json() {
        let filters: PolicyFilters = serde_json::from_str(r#"{"namespace_id":"ns1"}"#).unwrap();
        assert_eq!(filters.namespace_id(), Some("ns1"));
        assert!(filters.role_id().is_none());
    }
}
