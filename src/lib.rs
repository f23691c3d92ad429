// ============================================================================
// PolicyVault Library
// ============================================================================

pub mod config;
pub mod core;
pub mod history;
pub mod policy;
pub mod version;
pub mod web;

// Re-export main types for convenience
pub use config::RegistryConfig;
pub use crate::core::{
    Actor, OperationId, Policy, PolicyError, Result, Role, Rule, RuleType, VersionInfo,
    VersionMetadata,
};
pub use history::{HistoryStore, InMemoryHistoryStore, JsonFileHistoryStore};
pub use policy::{PolicyStore, policy_hash, validate_policy};
pub use version::{LockGuard, LockInfo, VersionRegistry};
