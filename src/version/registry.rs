use super::lock::{LockGuard, LockInfo, VersionLock};
use crate::config::RegistryConfig;
use crate::core::{OperationId, Policy, PolicyError, Result, VersionInfo, VersionMetadata};
use crate::history::HistoryStore;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

struct RegistryState {
    current: VersionInfo,
    history: BTreeMap<u64, VersionInfo>,
}

/// Owns the version counter, the version lock and the bounded history.
///
/// Reads (`get_current_version`, `get_version`) never touch the version
/// lock. Transitions (`increment_version*`, `rollback_to_version*`) run
/// under it; the `_as` variants join a lock already held by the caller.
pub struct VersionRegistry {
    config: RegistryConfig,
    lock: VersionLock,
    state: RwLock<RegistryState>,
    store: Arc<dyn HistoryStore>,
}

impl VersionRegistry {
    /// Registry starting at version 0 with an empty hash.
    pub fn new(config: RegistryConfig, store: Arc<dyn HistoryStore>) -> Result<Self> {
        Self::with_genesis(config, store, VersionInfo::genesis(""))
    }

    /// Registry whose initial state (and first history entry) is `genesis`.
    pub fn with_genesis(
        config: RegistryConfig,
        store: Arc<dyn HistoryStore>,
        genesis: VersionInfo,
    ) -> Result<Self> {
        config.validate().map_err(PolicyError::Config)?;

        let mut history = BTreeMap::new();
        history.insert(genesis.version, genesis.clone());

        Ok(Self {
            lock: VersionLock::new(&config),
            config,
            state: RwLock::new(RegistryState {
                current: genesis,
                history,
            }),
            store,
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Snapshot copy of the current version.
    pub async fn get_current_version(&self) -> VersionInfo {
        self.state.read().await.current.clone()
    }

    /// Stored metadata for `version`; evicted or unknown versions fail.
    pub async fn get_version(&self, version: u64) -> Result<VersionInfo> {
        self.state
            .read()
            .await
            .history
            .get(&version)
            .cloned()
            .ok_or_else(|| not_in_history(version))
    }

    /// Retained versions, ascending.
    pub async fn history_versions(&self) -> Vec<u64> {
        self.state.read().await.history.keys().copied().collect()
    }

    /// Take the version lock for a multi-step transition.
    pub async fn lock(&self, operation_id: OperationId) -> Result<LockGuard> {
        self.lock.acquire(operation_id).await.ok_or_else(|| {
            PolicyError::Lock(format!(
                "Failed to acquire version lock for operation {}",
                operation_id
            ))
        })
    }

    /// Release the lock if `operation_id` owns it; otherwise a no-op.
    pub fn release_lock(&self, operation_id: OperationId) -> bool {
        self.lock.release(operation_id)
    }

    pub fn lock_info(&self) -> Option<LockInfo> {
        self.lock.holder()
    }

    pub async fn increment_version(
        &self,
        hash: impl Into<String>,
        metadata: Option<VersionMetadata>,
    ) -> Result<VersionInfo> {
        self.increment_version_as(OperationId::new(), hash, metadata)
            .await
    }

    /// Allocate `current + 1`, record it (trimming history) and make it
    /// current. A failed durable trim leaves the registry untouched.
    pub async fn increment_version_as(
        &self,
        operation_id: OperationId,
        hash: impl Into<String>,
        metadata: Option<VersionMetadata>,
    ) -> Result<VersionInfo> {
        let _guard = self.lock.acquire(operation_id).await.ok_or_else(|| {
            PolicyError::Lock("Failed to acquire lock for version increment".to_string())
        })?;

        let (next, evicted) = {
            let state = self.state.read().await;
            let version = state.current.version.checked_add(1).ok_or_else(|| {
                PolicyError::Version("incrementVersion has failed: version overflow".to_string())
            })?;
            let next = VersionInfo {
                version,
                hash: hash.into(),
                timestamp: Utc::now(),
                metadata,
            };
            let evicted = plan_eviction(&state.history, version, self.config.max_history_size);
            (next, evicted)
        };

        if !evicted.is_empty() {
            self.store.delete(&evicted).await.map_err(|err| {
                PolicyError::Version(format!("incrementVersion has failed: history trim: {}", err))
            })?;
            debug!(?evicted, "trimmed version history");
        }

        {
            let mut state = self.state.write().await;
            for version in &evicted {
                state.history.remove(version);
            }
            state.history.insert(next.version, next.clone());
            state.current = next.clone();
        }

        info!(version = next.version, hash = %next.hash, %operation_id, "policy version incremented");
        Ok(next)
    }

    pub async fn rollback_to_version(&self, version: u64) -> Result<(VersionInfo, Policy)> {
        self.rollback_to_version_as(OperationId::new(), version)
            .await
    }

    /// Make the stored `version` current again and return it with its
    /// content. The version number is reused, not advanced.
    pub async fn rollback_to_version_as(
        &self,
        operation_id: OperationId,
        version: u64,
    ) -> Result<(VersionInfo, Policy)> {
        let target = self.get_version(version).await?;
        let content = self
            .store
            .load(version)
            .await
            .map_err(|err| {
                PolicyError::Version(format!("Version {} content unavailable: {}", version, err))
            })?
            .ok_or_else(|| not_in_history(version))?;

        let _guard = self.lock.acquire(operation_id).await.ok_or_else(|| {
            PolicyError::Lock("Failed to acquire lock for version rollback".to_string())
        })?;

        {
            let mut state = self.state.write().await;
            if !state.history.contains_key(&version) {
                return Err(not_in_history(version));
            }
            state.current = target.clone();
        }

        warn!(version, %operation_id, "rolled back to policy version");
        Ok((target, content))
    }

    /// Persist the content paired with `version`.
    pub async fn save_content(&self, version: u64, policy: &Policy) -> Result<()> {
        self.store.save(version, policy).await
    }

    /// Content stored for `version`, if it is still retained.
    pub async fn load_content(&self, version: u64) -> Result<Option<Policy>> {
        if !self.state.read().await.history.contains_key(&version) {
            return Err(not_in_history(version));
        }
        self.store.load(version).await
    }
}

fn not_in_history(version: u64) -> PolicyError {
    PolicyError::Version(format!("Version {} not found in history", version))
}

/// Lowest versions to drop so that history plus `incoming` fits `cap`.
fn plan_eviction(history: &BTreeMap<u64, VersionInfo>, incoming: u64, cap: usize) -> BTreeSet<u64> {
    let mut retained: BTreeSet<u64> = history.keys().copied().collect();
    retained.insert(incoming);
    let excess = retained.len().saturating_sub(cap);
    retained
        .into_iter()
        .filter(|version| *version != incoming)
        .take(excess)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::InMemoryHistoryStore;

    fn info(version: u64) -> VersionInfo {
        VersionInfo {
            version,
            hash: format!("h{}", version),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    #[test]
    fn test_plan_eviction_drops_lowest_first() {
        let history: BTreeMap<u64, VersionInfo> = (0..10).map(|v| (v, info(v))).collect();
        assert_eq!(plan_eviction(&history, 10, 10), BTreeSet::from([0]));
        assert_eq!(plan_eviction(&history, 10, 8), BTreeSet::from([0, 1, 2]));
        assert!(plan_eviction(&history, 10, 11).is_empty());
    }

    #[test]
    fn test_plan_eviction_with_reused_version() {
        // After a rollback the next number may already be retained.
        let history: BTreeMap<u64, VersionInfo> = (3..13).map(|v| (v, info(v))).collect();
        assert!(plan_eviction(&history, 4, 10).is_empty());
    }

    #[tokio::test]
    async fn test_new_registry_starts_at_zero() {
        let registry =
            VersionRegistry::new(RegistryConfig::default(), Arc::new(InMemoryHistoryStore::new()))
                .unwrap();
        let current = registry.get_current_version().await;
        assert_eq!(current.version, 0);
        assert_eq!(current.hash, "");
        assert_eq!(registry.history_versions().await, vec![0]);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let result = VersionRegistry::new(
            RegistryConfig::default().max_history_size(0),
            Arc::new(InMemoryHistoryStore::new()),
        );
        assert!(matches!(result, Err(PolicyError::Config(_))));
    }

    #[tokio::test]
    async fn test_increment_releases_lock() {
        let registry =
            VersionRegistry::new(RegistryConfig::default(), Arc::new(InMemoryHistoryStore::new()))
                .unwrap();
        let next = registry.increment_version("abc", None).await.unwrap();
        assert_eq!(next.version, 1);
        assert!(registry.lock_info().is_none());
    }

    #[tokio::test]
    async fn test_load_content_of_unknown_version() {
        let store = Arc::new(InMemoryHistoryStore::new());
        store.save(0, &Policy::empty()).await.unwrap();
        let registry = VersionRegistry::new(RegistryConfig::default(), store).unwrap();

        assert_eq!(registry.load_content(0).await.unwrap(), Some(Policy::empty()));
        assert!(matches!(
            registry.load_content(5).await,
            Err(PolicyError::Version(_))
        ));
    }
}
