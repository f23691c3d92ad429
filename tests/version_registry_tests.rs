/// Version registry tests
///
/// Counter monotonicity, bounded history, rollback and lock contention.
/// Run with: cargo test --test version_registry_tests

use policyvault::{
    HistoryStore, InMemoryHistoryStore, OperationId, Policy, PolicyError, RegistryConfig, Rule,
    RuleType, VersionRegistry,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};

fn registry_with(config: RegistryConfig) -> (Arc<VersionRegistry>, Arc<InMemoryHistoryStore>) {
    let store = Arc::new(InMemoryHistoryStore::new());
    let registry = VersionRegistry::new(config, store.clone()).unwrap();
    (Arc::new(registry), store)
}

fn policy_at(version: u64) -> Policy {
    Policy {
        rules: vec![Rule::new(version as i64, RuleType::Exists, "rule", 1, "A")],
        version,
    }
}

#[tokio::test]
async fn test_versions_increase_by_one() {
    let (registry, _) = registry_with(RegistryConfig::default());

    let mut previous = registry.get_current_version().await.version;
    for i in 0..5 {
        let next = registry
            .increment_version(format!("hash-{}", i), None)
            .await
            .unwrap();
        assert_eq!(next.version, previous + 1);
        assert_eq!(registry.get_current_version().await, next);
        previous = next.version;
    }
}

#[tokio::test]
async fn test_history_keeps_most_recent_versions() {
    let (registry, store) = registry_with(RegistryConfig::default());
    registry.save_content(0, &policy_at(0)).await.unwrap();

    for _ in 0..12 {
        let info = registry.increment_version("h", None).await.unwrap();
        registry
            .save_content(info.version, &policy_at(info.version))
            .await
            .unwrap();
    }

    let expected: Vec<u64> = (3..=12).collect();
    assert_eq!(registry.history_versions().await, expected);
    assert_eq!(store.versions().await, expected);

    for evicted in 0..3 {
        assert!(matches!(
            registry.get_version(evicted).await,
            Err(PolicyError::Version(_))
        ));
        assert!(matches!(
            registry.rollback_to_version(evicted).await,
            Err(PolicyError::Version(_))
        ));
    }
}

#[tokio::test]
async fn test_rollback_returns_stored_content() {
    let (registry, _) = registry_with(RegistryConfig::default());
    registry.save_content(0, &policy_at(0)).await.unwrap();

    let mut infos = Vec::new();
    for _ in 0..3 {
        let info = registry.increment_version("h", None).await.unwrap();
        registry
            .save_content(info.version, &policy_at(info.version))
            .await
            .unwrap();
        infos.push(info);
    }

    let (info, content) = registry.rollback_to_version(1).await.unwrap();
    assert_eq!(info, infos[0]);
    assert_eq!(content, policy_at(1));
    assert_eq!(registry.get_current_version().await, infos[0]);
    assert!(registry.lock_info().is_none());
}

#[tokio::test]
async fn test_rollback_reuses_version_number() {
    let (registry, _) = registry_with(RegistryConfig::default());
    registry.save_content(0, &policy_at(0)).await.unwrap();
    for _ in 0..3 {
        registry.increment_version("h", None).await.unwrap();
    }

    registry.rollback_to_version(0).await.unwrap();
    assert_eq!(registry.get_current_version().await.version, 0);

    // The next increment lands on a number that already existed.
    let next = registry.increment_version("after-rollback", None).await.unwrap();
    assert_eq!(next.version, 1);
    assert_eq!(registry.get_version(1).await.unwrap().hash, "after-rollback");
}

#[tokio::test]
async fn test_rollback_to_unknown_version_leaves_state() {
    let (registry, _) = registry_with(RegistryConfig::default());
    let current = registry.increment_version("h", None).await.unwrap();

    let err = registry.rollback_to_version(42).await.unwrap_err();
    assert!(matches!(err, PolicyError::Version(_)));
    assert_eq!(registry.get_current_version().await, current);
}

#[tokio::test]
async fn test_rollback_without_content_fails() {
    let (registry, store) = registry_with(RegistryConfig::default());
    let info = registry.increment_version("h", None).await.unwrap();
    assert!(store.load(info.version).await.unwrap().is_none());

    let err = registry.rollback_to_version(info.version).await.unwrap_err();
    assert!(matches!(err, PolicyError::Version(_)));
}

#[tokio::test(start_paused = true)]
async fn test_increment_fails_while_lock_held() {
    let (registry, _) = registry_with(RegistryConfig::default());
    let holder = OperationId::new();
    let guard = registry.lock(holder).await.unwrap();

    let started = Instant::now();
    let err = registry.increment_version("h", None).await.unwrap_err();
    assert!(matches!(err, PolicyError::Lock(_)));
    assert!(started.elapsed() <= registry.config().max_lock_wait());
    assert_eq!(registry.get_current_version().await.version, 0);

    drop(guard);
    let next = registry.increment_version("h", None).await.unwrap();
    assert_eq!(next.version, 1);
}

#[tokio::test(start_paused = true)]
async fn test_waiting_increment_proceeds_after_release() {
    let (registry, _) = registry_with(RegistryConfig::default());
    let guard = registry.lock(OperationId::new()).await.unwrap();

    let waiter = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.increment_version("waited", None).await })
    };

    sleep(Duration::from_millis(150)).await;
    assert_eq!(registry.get_current_version().await.version, 0);
    drop(guard);

    let next = waiter.await.unwrap().unwrap();
    assert_eq!(next.version, 1);
    assert_eq!(next.hash, "waited");
}

#[tokio::test(start_paused = true)]
async fn test_held_lock_outlives_timeout_through_renewal() {
    let (registry, _) = registry_with(RegistryConfig::default());
    let holder = OperationId::new();
    let _guard = registry.lock(holder).await.unwrap();

    sleep(Duration::from_secs(12)).await;
    assert_eq!(registry.lock_info().map(|info| info.operation_id), Some(holder));
    assert!(matches!(
        registry.increment_version("h", None).await,
        Err(PolicyError::Lock(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_release_lock_requires_owner() {
    let (registry, _) = registry_with(RegistryConfig::default());
    let holder = OperationId::new();
    let _guard = registry.lock(holder).await.unwrap();

    assert!(!registry.release_lock(OperationId::new()));
    assert!(registry.lock_info().is_some());
    assert!(registry.release_lock(holder));
    assert!(registry.lock_info().is_none());
}

#[tokio::test]
async fn test_reentrant_increment_under_caller_lock() {
    let (registry, _) = registry_with(RegistryConfig::default());
    let operation_id = OperationId::new();
    let _guard = registry.lock(operation_id).await.unwrap();

    let first = registry
        .increment_version_as(operation_id, "a", None)
        .await
        .unwrap();
    let second = registry
        .increment_version_as(operation_id, "b", None)
        .await
        .unwrap();
    assert_eq!((first.version, second.version), (1, 2));
    // Still held by the caller's guard.
    assert_eq!(
        registry.lock_info().map(|info| info.operation_id),
        Some(operation_id)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_increments_issue_distinct_versions() {
    let (registry, _) = registry_with(RegistryConfig::default());

    let mut handles = vec![];
    for task_id in 0..8 {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            registry
                .increment_version(format!("task-{}", task_id), None)
                .await
        }));
    }

    let mut versions = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(info) => versions.push(info.version),
            Err(PolicyError::Lock(_)) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    versions.sort_unstable();
    let expected: Vec<u64> = (1..=versions.len() as u64).collect();
    assert_eq!(versions, expected);
    assert_eq!(
        registry.get_current_version().await.version,
        versions.len() as u64
    );
}
