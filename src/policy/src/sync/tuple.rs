//! Relation tuple projection of a policy

use crate::types::{Policy, PolicyBinding};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Object type of the tuple's resource side
pub const NAMESPACE_OBJECT_TYPE: &str = "namespace";

/// Object type of the tuple's subject side
pub const ROLE_SUBJECT_TYPE: &str = "role";

/// Typed reference to an object in the relation store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Object type (e.g. "namespace", "role")
    pub object_type: String,

    /// Object identifier within its type
    pub object_id: String,
}

impl ObjectRef {
    /// Create a new object reference
    pub fn new(object_type: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            object_id: object_id.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.object_id)
    }
}

/// `object#relation@subject`
///
/// A policy `(role, namespace, action)` projects to
/// `namespace:<namespace>#<action>@role:<role>`: within the namespace, the
/// action relation is granted by the role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationTuple {
    /// Resource side
    pub object: ObjectRef,

    /// Relation name
    pub relation: String,

    /// Subject side
    pub subject: ObjectRef,
}

impl RelationTuple {
    /// Create a new relation tuple
    pub fn new(object: ObjectRef, relation: impl Into<String>, subject: ObjectRef) -> Self {
        Self {
            object,
            relation: relation.into(),
            subject,
        }
    }

    /// Tuple granted by a binding
    pub fn from_binding(binding: &PolicyBinding) -> Self {
        Self::new(
            ObjectRef::new(NAMESPACE_OBJECT_TYPE, &binding.namespace_id),
            &binding.action_id,
            ObjectRef::new(ROLE_SUBJECT_TYPE, &binding.role_id),
        )
    }

    /// Tuple granted by a stored policy
    pub fn from_policy(policy: &Policy) -> Self {
        Self::new(
            ObjectRef::new(NAMESPACE_OBJECT_TYPE, &policy.namespace_id),
            &policy.action_id,
            ObjectRef::new(ROLE_SUBJECT_TYPE, &policy.role_id),
        )
    }

    /// Binding this tuple is the projection of, if it has the policy shape
    /// (`namespace` resource, `role` subject)
    pub fn binding(&self) -> Option<PolicyBinding> {
        if self.object.object_type != NAMESPACE_OBJECT_TYPE
            || self.subject.object_type != ROLE_SUBJECT_TYPE
        {
            return None;
        }

        Some(PolicyBinding::new(
            &self.subject.object_id,
            &self.object.object_id,
            &self.relation,
        ))
    }
}

impl fmt::Display for RelationTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.object, self.relation, self.subject)
    }
}
