//! Integration tests for the manager registry and background sync

mod common;

use bridge_traits::{CacheStore, RemoteError, RemoteErrorKind, SyncTokenStore};
use common::*;
use core_runtime::config::SyncConfig;
use core_runtime::events::{AccountEvent, CoreEvent, EventBus};
use core_sync::{
    run_background_sync, AccountHandle, AccountId, BackgroundFetchResult,
    BackgroundSyncScheduler, LocalStores, ManagerRegistry, SyncError, SyncOutcome,
};
use std::sync::Arc;
use std::time::Duration;

fn registry(h: &Harness) -> ManagerRegistry {
    ManagerRegistry::new(SyncConfig::default(), h.event_bus.clone()).unwrap()
}

fn other_account(h: &Harness, id: &str) -> AccountHandle {
    let stores = LocalStores::new(
        Arc::new(MemoryCache::default()),
        Arc::new(MemoryTokens::default()),
        Arc::new(MemoryDirty::default()),
    );
    AccountHandle::new(id, h.remote.clone(), stores)
}

// ============================================================================
// Registry
// ============================================================================

#[tokio::test]
async fn test_registry_returns_one_manager_per_account() {
    let h = Harness::new(FakeRemote::new());
    let registry = registry(&h);
    let mut events = h.event_bus.subscribe();

    let first = registry.get_manager(&h.account()).await.unwrap();
    let again = registry.get_manager(&h.account()).await.unwrap();
    let bob = registry.get_manager(&other_account(&h, "bob")).await.unwrap();

    assert!(Arc::ptr_eq(&first, &again));
    assert!(!Arc::ptr_eq(&first, &bob));
    assert_eq!(registry.len().await, 2);
    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::Account(AccountEvent::ManagerCreated {
            account: "alice".into()
        })
    );
}

#[tokio::test]
async fn test_registry_concurrent_creation_is_idempotent() {
    let h = Harness::new(FakeRemote::new());
    let registry = Arc::new(registry(&h));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let account = h.account();
            tokio::spawn(async move { registry.get_manager(&account).await.unwrap() })
        })
        .collect();

    let mut managers = Vec::new();
    for task in tasks {
        managers.push(task.await.unwrap());
    }

    assert!(managers.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn test_shared_manager_drops_overlapping_callers() {
    let gate = Arc::new(tokio::sync::Notify::new());
    let h = Harness::new(FakeRemote::gated(gate.clone()));
    let registry = registry(&h);

    let manager = registry.get_manager(&h.account()).await.unwrap();
    let running = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.sync().await }
    });
    h.remote.entered.notified().await;

    // A second caller resolving the same account shares the busy flag
    let other = registry.get_manager(&h.account()).await.unwrap();
    assert_eq!(other.sync().await.unwrap(), SyncOutcome::AlreadySyncing);

    gate.notify_one();
    assert!(running.await.unwrap().unwrap().started());
}

#[tokio::test]
async fn test_remove_manager_evicts_instance() {
    let h = Harness::new(FakeRemote::new());
    let registry = registry(&h);
    let id = AccountId::new("alice");

    let first = registry.get_manager(&h.account()).await.unwrap();
    let removed = registry.remove_manager(&id).await.unwrap();
    assert!(Arc::ptr_eq(&first, &removed));
    assert!(registry.remove_manager(&id).await.is_none());
    assert!(!registry.contains(&id).await);

    let fresh = registry.get_manager(&h.account()).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &fresh));
}

#[tokio::test]
async fn test_registry_queues_non_fatal_errors() {
    let h = Harness::new(FakeRemote::new());
    h.remote
        .push_collection_page(Err(RemoteError::PermissionDenied("read-only".into())))
        .await;
    let registry = registry(&h);
    let id = AccountId::new("alice");

    let manager = registry.get_manager(&h.account()).await.unwrap();
    manager.sync().await.unwrap();

    let queue = registry.error_queue(&id).await.unwrap();
    let latest = queue.pop_latest().await.unwrap();
    assert_eq!(latest.kind, RemoteErrorKind::PermissionDenied);
    assert!(queue.is_empty().await);
}

#[tokio::test]
async fn test_logout_wipes_local_state() {
    let h = Harness::new(FakeRemote::new());
    h.stage_dirty(&notebook("col-1"), 1).await;
    h.tokens.set_global_token(Some(&token("g1"))).await.unwrap();
    let registry = registry(&h);
    let id = AccountId::new("alice");

    registry.get_manager(&h.account()).await.unwrap();
    registry.logout(&id).await.unwrap();

    assert!(registry.is_empty().await);
    assert!(h.cache.list_collections().await.unwrap().is_empty());
    assert!(h.tokens.get_global_token().await.unwrap().is_none());

    // Logging out again is a no-op
    registry.logout(&id).await.unwrap();
}

#[tokio::test]
async fn test_logout_during_sync_can_be_retried() {
    let gate = Arc::new(tokio::sync::Notify::new());
    let h = Harness::new(FakeRemote::gated(gate.clone()));
    h.remote
        .push_collection_page(Ok(collection_page(vec![notebook("col-1")], &[], "g1", true)))
        .await;
    let registry = registry(&h);
    let id = AccountId::new("alice");

    let manager = registry.get_manager(&h.account()).await.unwrap();
    let running = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.sync().await }
    });
    h.remote.entered.notified().await;

    let err = registry.logout(&id).await.unwrap_err();
    assert!(matches!(err, SyncError::SyncInProgress { .. }));
    assert!(registry.contains(&id).await);

    gate.notify_one();
    running.await.unwrap().unwrap();
    assert_eq!(h.cache.collection_uids().await, vec!["col-1".to_string()]);

    registry.logout(&id).await.unwrap();

    assert!(!registry.contains(&id).await);
    assert!(h.cache.list_collections().await.unwrap().is_empty());
    assert!(h.tokens.get_global_token().await.unwrap().is_none());
}

#[tokio::test]
async fn test_registry_rejects_invalid_config() {
    let result = ManagerRegistry::new(
        SyncConfig::default().with_accepted_types(Vec::<String>::new()),
        EventBus::new(8),
    );
    assert!(result.is_err());
}

// ============================================================================
// Background sync
// ============================================================================

#[tokio::test]
async fn test_background_sync_reports_new_data() {
    let h = Harness::new(FakeRemote::new());
    h.remote
        .push_collection_page(Ok(collection_page(vec![notebook("col-1")], &[], "t1", true)))
        .await;
    let manager = Arc::new(h.manager());

    let result = run_background_sync(manager, Duration::from_secs(27)).await;

    assert_eq!(result, BackgroundFetchResult::NewData);
}

#[tokio::test]
async fn test_background_sync_reports_no_data() {
    let h = Harness::new(FakeRemote::new());
    let manager = Arc::new(h.manager());

    let result = run_background_sync(manager, Duration::from_secs(27)).await;

    assert_eq!(result, BackgroundFetchResult::NoData);
}

#[tokio::test]
async fn test_background_sync_reports_failure() {
    let h = Harness::new(FakeRemote::new());
    h.remote
        .push_collection_page(Err(RemoteError::Unclassified("corrupt".into())))
        .await;
    let manager = Arc::new(h.manager());

    let result = run_background_sync(manager, Duration::from_secs(27)).await;

    assert_eq!(result, BackgroundFetchResult::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_background_sync_stops_waiting_after_budget() {
    let h = Harness::new(FakeRemote::delayed(Duration::from_secs(60)));
    let manager = Arc::new(h.manager());

    let result = run_background_sync(Arc::clone(&manager), Duration::from_secs(27)).await;

    assert_eq!(result, BackgroundFetchResult::NoData);
    // The sync itself keeps running and finishes later
    assert!(manager.is_syncing());
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(!manager.is_syncing());
    assert!(manager.status_snapshot().last_sync.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_runs_on_interval_until_stopped() {
    let h = Harness::new(FakeRemote::new());
    let manager = Arc::new(h.manager());
    let interval = Duration::from_secs(3600);

    let handle = BackgroundSyncScheduler::start(
        Arc::clone(&manager),
        interval,
        Duration::from_secs(27),
    );
    assert!(handle.is_running());

    // Nothing runs before the first full interval
    tokio::time::sleep(interval / 2).await;
    assert!(h.remote.calls().await.is_empty());

    tokio::time::sleep(interval * 2).await;
    let listings = h
        .remote
        .calls()
        .await
        .into_iter()
        .filter(|call| matches!(call, RemoteCall::ListCollections(_)))
        .count();
    assert_eq!(listings, 2);

    handle.stop().await;
    tokio::time::sleep(interval * 2).await;
    assert_eq!(h.remote.calls().await.len(), listings);
}
