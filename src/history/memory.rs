use super::HistoryStore;
use crate::core::{Policy, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;

/// Process-local history store. Used by tests and by embedders that do not
/// need history to survive a restart.
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    entries: RwLock<BTreeMap<u64, Policy>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Versions currently stored, ascending.
    pub async fn versions(&self) -> Vec<u64> {
        self.entries.read().await.keys().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn load(&self, version: u64) -> Result<Option<Policy>> {
        Ok(self.entries.read().await.get(&version).cloned())
    }

    async fn save(&self, version: u64, policy: &Policy) -> Result<()> {
        self.entries.write().await.insert(version, policy.clone());
        Ok(())
    }

    async fn delete(&self, versions: &BTreeSet<u64>) -> Result<()> {
        let mut entries = self.entries.write().await;
        for version in versions {
            entries.remove(version);
        }
        Ok(())
    }
}
