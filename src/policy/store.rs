use super::hash::policy_hash;
use super::validate::{check_document, check_policy};
use crate::config::RegistryConfig;
use crate::core::{
    Actor, OperationId, Policy, PolicyError, Result, VersionInfo, VersionMetadata,
};
use crate::history::HistoryStore;
use crate::version::VersionRegistry;
use chrono::Utc;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Authoritative holder of the current policy.
///
/// Every write goes through [`PolicyStore::update_policy`], which validates,
/// sorts and hashes the incoming policy and drives the version transition
/// (with one compensating rollback) against the [`VersionRegistry`].
pub struct PolicyStore {
    registry: Arc<VersionRegistry>,
    policy: RwLock<Policy>,
}

impl PolicyStore {
    /// Open a store whose version 0 is `initial` (or the empty policy).
    pub async fn open(
        config: RegistryConfig,
        store: Arc<dyn HistoryStore>,
        initial: Option<Policy>,
    ) -> Result<Self> {
        let mut policy = initial.unwrap_or_default();
        check_policy(&policy)?;
        policy.sort_by_priority();

        let genesis = VersionInfo::genesis(policy_hash(&policy.rules)?);
        policy.version = genesis.version;

        let registry = VersionRegistry::with_genesis(config, store, genesis)?;
        if let Err(err) = registry.save_content(policy.version, &policy).await {
            warn!(error = %err, "failed to save initial policy to history");
        }

        Ok(Self {
            registry: Arc::new(registry),
            policy: RwLock::new(policy),
        })
    }

    /// Open a store seeded from a JSON policy file. A missing, unreadable or
    /// invalid file yields the empty policy rather than an error.
    pub async fn load_from_file<P: AsRef<Path>>(
        path: P,
        config: RegistryConfig,
        store: Arc<dyn HistoryStore>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let initial = match read_policy_file(path).await {
            Ok(Some(policy)) => {
                info!(path = %path.display(), rules = policy.rules.len(), "initial policy loaded");
                Some(policy)
            }
            Ok(None) => {
                info!(path = %path.display(), "no policy file found, starting with an empty policy");
                None
            }
            Err(err) => {
                error!(path = %path.display(), error = %err, "initial policy rejected");
                None
            }
        };

        Self::open(config, store, initial).await
    }

    pub fn registry(&self) -> &Arc<VersionRegistry> {
        &self.registry
    }

    /// Copy of the current policy.
    pub async fn get_policy(&self) -> Policy {
        self.policy.read().await.clone()
    }

    /// Cheap change probe: version number and content hash.
    pub async fn get_policy_version(&self) -> VersionInfo {
        self.registry.get_current_version().await
    }

    /// Validate a raw document, then apply it as [`update_policy`] does.
    ///
    /// [`update_policy`]: PolicyStore::update_policy
    pub async fn update_policy_document(&self, actor: &Actor, document: Value) -> Result<Policy> {
        check_document(&document)?;
        let policy: Policy = serde_json::from_value(document)
            .map_err(|e| PolicyError::Validation(format!("policy validation failed: {}", e)))?;
        self.update_policy(actor, policy).await
    }

    /// Replace the current policy, minting a new version.
    ///
    /// Validation and lock failures leave everything untouched. A failed
    /// version transition triggers one rollback to the version current
    /// before the call; if that fails too the result is
    /// [`PolicyError::Infra`].
    pub async fn update_policy(&self, actor: &Actor, new_policy: Policy) -> Result<Policy> {
        check_policy(&new_policy)?;

        let mut policy = new_policy;
        policy.sort_by_priority();
        let hash = policy_hash(&policy.rules)?;

        let operation_id = OperationId::new();
        let _guard = self.registry.lock(operation_id).await?;

        let previous_version = self.policy.read().await.version;
        let metadata = VersionMetadata {
            updated_by: actor.id.clone(),
            timestamp: Utc::now(),
            previous_version,
        };

        match self
            .registry
            .increment_version_as(operation_id, hash, Some(metadata))
            .await
        {
            Ok(version_info) => {
                policy.version = version_info.version;
                *self.policy.write().await = policy.clone();

                if let Err(err) = self.registry.save_content(policy.version, &policy).await {
                    warn!(version = policy.version, error = %err, "failed to save policy to history");
                }

                info!(version = policy.version, actor = %actor.id, "policy updated");
                Ok(policy)
            }
            Err(PolicyError::Version(reason)) => {
                warn!(previous_version, %reason, "policy update failed, rolling back");
                match self
                    .registry
                    .rollback_to_version_as(operation_id, previous_version)
                    .await
                {
                    Ok((_, restored)) => {
                        *self.policy.write().await = restored;
                        Err(PolicyError::Version(reason))
                    }
                    Err(rollback_err) => {
                        error!(
                            previous_version,
                            error = %rollback_err,
                            "failed to rollback policy"
                        );
                        Err(PolicyError::Infra(
                            "Policy update failed and rollback failed".to_string(),
                        ))
                    }
                }
            }
            Err(other) => Err(other),
        }
    }
}

async fn read_policy_file(path: &Path) -> Result<Option<Policy>> {
    if !tokio::fs::try_exists(path).await? {
        return Ok(None);
    }
    let content = tokio::fs::read_to_string(path).await?;
    let document: Value = serde_json::from_str(&content)
        .map_err(|e| PolicyError::Validation(format!("policy file is not valid JSON: {}", e)))?;
    check_document(&document)?;
    let policy = serde_json::from_value(document)
        .map_err(|e| PolicyError::Validation(format!("policy validation failed: {}", e)))?;
    Ok(Some(policy))
}
