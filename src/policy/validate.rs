//! Structural checks applied before a policy may be adopted.

use crate::core::{Policy, PolicyError, Result, RuleType};
use serde_json::Value;
use std::collections::HashSet;

/// Whether a raw policy document is acceptable.
pub fn validate_policy(document: &Value) -> bool {
    check_document(document).is_ok()
}

/// Check a raw document: a `rules` array whose entries carry an integer
/// `id`, a known string `type`, a string `displayName`, an integer
/// `priority` and a string `condition`, with no duplicate ids.
pub fn check_document(document: &Value) -> Result<()> {
    let rules = document
        .get("rules")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("policy must contain a 'rules' array"))?;

    let mut ids = Vec::with_capacity(rules.len());
    for (index, rule) in rules.iter().enumerate() {
        ids.push(check_rule(index, rule)?);
    }

    check_unique_ids(ids)
}

fn check_rule(index: usize, rule: &Value) -> Result<i64> {
    let id = rule
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| invalid(format!("rule #{} must have a numeric 'id'", index)))?;

    let rule_type = rule
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(format!("rule {} must have a string 'type'", id)))?;
    if serde_json::from_value::<RuleType>(Value::from(rule_type)).is_err() {
        return Err(invalid(format!("rule {} has unknown type '{}'", id, rule_type)));
    }

    for field in ["displayName", "condition"] {
        if !rule.get(field).is_some_and(Value::is_string) {
            return Err(invalid(format!("rule {} must have a string '{}'", id, field)));
        }
    }

    if rule.get("priority").and_then(Value::as_i64).is_none() {
        return Err(invalid(format!("rule {} must have a numeric 'priority'", id)));
    }

    Ok(id)
}

/// Check a typed policy. Field types are guaranteed by construction, so only
/// id uniqueness remains.
pub fn check_policy(policy: &Policy) -> Result<()> {
    check_unique_ids(policy.rules.iter().map(|rule| rule.id))
}

fn check_unique_ids(ids: impl IntoIterator<Item = i64>) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(invalid(format!("duplicate rule id {}", id)));
        }
    }
    Ok(())
}

fn invalid(reason: impl Into<String>) -> PolicyError {
    PolicyError::Validation(format!("policy validation failed: {}", reason.into()))
}
