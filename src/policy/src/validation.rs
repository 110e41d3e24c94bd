//! Identifier validation for policy input
//!
//! Runs before any store interaction and has no side effects.
//!
//! Role and namespace ids become relation tuple object ids and action ids
//! become relation names, so both are held to the relation store's charset.
//! Anything accepted here can be written to the relation store.

use crate::error::{PolicyError, Result};
use crate::types::PolicyBinding;
use regex::Regex;
use std::sync::OnceLock;

/// Longest identifier accepted for any reference
pub const MAX_IDENTIFIER_LEN: usize = 255;

/// Longest action id (relation name)
pub const MAX_ACTION_LEN: usize = 64;

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_./:\-]*$").expect("identifier pattern compiles")
    })
}

fn object_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_/\-]*$").expect("object id pattern compiles")
    })
}

fn relation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z][a-z0-9_]{1,62}[a-z0-9]$").expect("relation pattern compiles")
    })
}

fn check(field: &'static str, value: &str, max_len: usize) -> Result<()> {
    if value.is_empty() {
        return Err(PolicyError::validation(field, "must not be empty"));
    }

    if value.len() > max_len {
        return Err(PolicyError::validation(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

/// Check that `value` is a well-formed platform identifier.
///
/// Identifiers start with an ASCII alphanumeric character and continue with
/// alphanumerics or `_ - . / :`, up to [`MAX_IDENTIFIER_LEN`] characters.
pub fn validate_identifier(field: &'static str, value: &str) -> Result<()> {
    check(field, value, MAX_IDENTIFIER_LEN)?;

    if !identifier_pattern().is_match(value) {
        return Err(PolicyError::validation(
            field,
            format!(
                "'{}' must start with a letter or digit and contain only letters, digits, '_', '-', '.', '/' or ':'",
                value
            ),
        ));
    }

    Ok(())
}

/// Check a role or namespace id, which is stored as a tuple object id.
///
/// Starts with an ASCII alphanumeric character and continues with
/// alphanumerics or `_ - /`.
pub fn validate_object_id(field: &'static str, value: &str) -> Result<()> {
    check(field, value, MAX_IDENTIFIER_LEN)?;

    if !object_id_pattern().is_match(value) {
        return Err(PolicyError::validation(
            field,
            format!(
                "'{}' must start with a letter or digit and contain only letters, digits, '_', '-' or '/'",
                value
            ),
        ));
    }

    Ok(())
}

/// Check an action id, which is stored as a tuple relation name.
///
/// 3 to 64 characters of `[a-z0-9_]`, starting with a letter and not ending
/// with `_`.
pub fn validate_action_id(field: &'static str, value: &str) -> Result<()> {
    check(field, value, MAX_ACTION_LEN)?;

    if !relation_pattern().is_match(value) {
        return Err(PolicyError::validation(
            field,
            format!(
                "'{}' must be 3-64 lowercase letters, digits or '_', start with a letter and not end with '_'",
                value
            ),
        ));
    }

    Ok(())
}

/// Validate all three references of a binding, in `role_id`, `namespace_id`,
/// `action_id` order
pub fn validate_binding(binding: &PolicyBinding) -> Result<()> {
    validate_object_id("role_id", &binding.role_id)?;
    validate_object_id("namespace_id", &binding.namespace_id)?;
    validate_action_id("action_id", &binding.action_id)?;
    Ok(())
}

/// Validate a policy id passed to get/update
pub fn validate_policy_id(id: &str) -> Result<()> {
    validate_identifier("id", id)
}
