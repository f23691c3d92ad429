// ============================================================================
// Durable Policy History
// ============================================================================
//
// Version -> policy content persistence consumed by the version registry
// (eviction mirror, rollback reads) and by the policy store (saves after a
// successful transition). Whole-document semantics only.
//
// ============================================================================

pub mod file;
pub mod memory;

pub use file::JsonFileHistoryStore;
pub use memory::InMemoryHistoryStore;

use crate::core::{Policy, Result};
use async_trait::async_trait;
use std::collections::BTreeSet;

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Content stored for `version`, if any.
    async fn load(&self, version: u64) -> Result<Option<Policy>>;

    /// Store (or replace) the content for `version`.
    async fn save(&self, version: u64, policy: &Policy) -> Result<()>;

    /// Remove every listed version. Unknown versions are ignored.
    async fn delete(&self, versions: &BTreeSet<u64>) -> Result<()>;
}
