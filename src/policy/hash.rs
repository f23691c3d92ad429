use crate::core::{PolicyError, Result, Rule};
use sha2::{Digest, Sha256};

/// SHA-256 (lowercase hex) of the canonical JSON encoding of `rules`.
///
/// Objects are re-encoded through `serde_json::Value`, whose map keeps keys
/// sorted, so field order never affects the digest; sequence order does.
pub fn policy_hash(rules: &[Rule]) -> Result<String> {
    let canonical = serde_json::to_value(rules)
        .and_then(|value| serde_json::to_vec(&value))
        .map_err(|e| PolicyError::Validation(format!("policy is not serializable: {}", e)))?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}
