//! Shared fakes for the sync integration tests.
//!
//! In-memory stores plus a scriptable remote that records every call.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result, RemoteResult},
    CacheStore, Collection, CollectionListResponse, CollectionMeta, DirtyIndex, DirtyTracker,
    ErrorSink, FetchOptions, Item, ItemListResponse, NonFatalError, RemoteError, RemoteStore,
    RemovedMembership, SyncToken, SyncTokenStore,
};
use core_runtime::config::SyncConfig;
use core_runtime::events::EventBus;
use core_sync::{AccountHandle, LocalStores, StatusSink, SyncManager};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

pub const NOTE_TYPE: &str = "etebase.md.note";

// ============================================================================
// Fixtures
// ============================================================================

pub fn notebook(uid: &str) -> Collection {
    Collection::new(uid, CollectionMeta::new(NOTE_TYPE, format!("Notebook {}", uid)))
}

pub fn calendar(uid: &str) -> Collection {
    Collection::new(uid, CollectionMeta::new("etebase.vevent", "Calendar"))
}

pub fn token(value: &str) -> SyncToken {
    SyncToken::new(value)
}

pub fn collection_page(
    data: Vec<Collection>,
    removed: &[&str],
    token_value: &str,
    done: bool,
) -> CollectionListResponse {
    CollectionListResponse {
        data,
        removed_memberships: removed
            .iter()
            .map(|uid| RemovedMembership {
                uid: uid.to_string(),
            })
            .collect(),
        token: Some(token(token_value)),
        done,
    }
}

pub fn item_page(uids: &[&str], token_value: &str, done: bool) -> ItemListResponse {
    ItemListResponse {
        data: uids.iter().map(|uid| Item::new(*uid).with_etag("remote")).collect(),
        token: Some(token(token_value)),
        done,
    }
}

// ============================================================================
// Local stores
// ============================================================================

#[derive(Default)]
pub struct MemoryCache {
    collections: Mutex<BTreeMap<String, (Collection, BTreeMap<String, Item>)>>,
}

impl MemoryCache {
    pub async fn item_uids(&self, collection_uid: &str) -> Vec<String> {
        self.collections
            .lock()
            .await
            .get(collection_uid)
            .map(|(_, items)| items.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn collection_uids(&self) -> Vec<String> {
        self.collections.lock().await.keys().cloned().collect()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn upsert_collection(&self, collection: &Collection) -> Result<()> {
        let mut collections = self.collections.lock().await;
        match collections.get_mut(&collection.uid) {
            Some((existing, _)) => *existing = collection.clone(),
            None => {
                collections.insert(collection.uid.clone(), (collection.clone(), BTreeMap::new()));
            }
        }
        Ok(())
    }

    async fn remove_collection(&self, collection_uid: &str) -> Result<()> {
        self.collections.lock().await.remove(collection_uid);
        Ok(())
    }

    async fn get_collection(&self, collection_uid: &str) -> Result<Option<Collection>> {
        Ok(self
            .collections
            .lock()
            .await
            .get(collection_uid)
            .map(|(collection, _)| collection.clone()))
    }

    async fn list_collections(&self) -> Result<Vec<Collection>> {
        Ok(self
            .collections
            .lock()
            .await
            .values()
            .map(|(collection, _)| collection.clone())
            .collect())
    }

    async fn bulk_set_items(&self, collection_uid: &str, items: &[Item]) -> Result<()> {
        let mut collections = self.collections.lock().await;
        let (_, cached) = collections.get_mut(collection_uid).ok_or_else(|| {
            BridgeError::OperationFailed(format!("collection {} not cached", collection_uid))
        })?;
        for item in items {
            cached.insert(item.uid.clone(), item.clone());
        }
        Ok(())
    }

    async fn get_item(&self, collection_uid: &str, item_uid: &str) -> Result<Option<Item>> {
        Ok(self
            .collections
            .lock()
            .await
            .get(collection_uid)
            .and_then(|(_, items)| items.get(item_uid).cloned()))
    }

    async fn list_items(&self, collection_uid: &str) -> Result<Vec<Item>> {
        Ok(self
            .collections
            .lock()
            .await
            .get(collection_uid)
            .map(|(_, items)| items.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear_all(&self) -> Result<()> {
        self.collections.lock().await.clear();
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryTokens {
    global: Mutex<Option<SyncToken>>,
    collections: Mutex<HashMap<String, SyncToken>>,
    pub global_writes: AtomicUsize,
    pub collection_writes: AtomicUsize,
}

impl MemoryTokens {
    pub fn global_writes(&self) -> usize {
        self.global_writes.load(Ordering::SeqCst)
    }

    pub fn collection_writes(&self) -> usize {
        self.collection_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SyncTokenStore for MemoryTokens {
    async fn get_collection_token(&self, collection_uid: &str) -> Result<Option<SyncToken>> {
        Ok(self.collections.lock().await.get(collection_uid).cloned())
    }

    async fn set_collection_token(
        &self,
        collection_uid: &str,
        token: Option<&SyncToken>,
    ) -> Result<()> {
        self.collection_writes.fetch_add(1, Ordering::SeqCst);
        let mut collections = self.collections.lock().await;
        match token {
            Some(token) => collections.insert(collection_uid.to_string(), token.clone()),
            None => collections.remove(collection_uid),
        };
        Ok(())
    }

    async fn get_global_token(&self) -> Result<Option<SyncToken>> {
        Ok(self.global.lock().await.clone())
    }

    async fn set_global_token(&self, token: Option<&SyncToken>) -> Result<()> {
        self.global_writes.fetch_add(1, Ordering::SeqCst);
        *self.global.lock().await = token.cloned();
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        *self.global.lock().await = None;
        self.collections.lock().await.clear();
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDirty {
    index: Mutex<DirtyIndex>,
}

#[async_trait]
impl DirtyTracker for MemoryDirty {
    async fn list_by_collection(&self) -> Result<DirtyIndex> {
        Ok(self.index.lock().await.clone())
    }

    async fn mark_dirty(&self, collection_uid: &str, item_uid: &str) -> Result<()> {
        self.index
            .lock()
            .await
            .entry(collection_uid.to_string())
            .or_default()
            .insert(item_uid.to_string());
        Ok(())
    }

    async fn clear(&self, collection_uid: &str, item_uid: &str) -> Result<()> {
        let mut index = self.index.lock().await;
        if let Some(items) = index.get_mut(collection_uid) {
            items.remove(item_uid);
            if items.is_empty() {
                index.remove(collection_uid);
            }
        }
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        self.index.lock().await.clear();
        Ok(())
    }
}

/// Error sink that keeps everything it is given.
#[derive(Default)]
pub struct RecordingErrorSink {
    pub recorded: Mutex<Vec<NonFatalError>>,
    pub fail: bool,
}

impl RecordingErrorSink {
    pub fn failing() -> Self {
        Self {
            recorded: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub async fn messages(&self) -> Vec<String> {
        self.recorded
            .lock()
            .await
            .iter()
            .map(|error| error.message.clone())
            .collect()
    }
}

#[async_trait]
impl ErrorSink for RecordingErrorSink {
    async fn record_non_fatal(&self, error: NonFatalError) -> Result<()> {
        if self.fail {
            return Err(BridgeError::OperationFailed("error sink unavailable".into()));
        }
        self.recorded.lock().await.push(error);
        Ok(())
    }
}

/// Status sink that keeps every transition in order.
#[derive(Default)]
pub struct RecordingStatusSink {
    pub statuses: std::sync::Mutex<Vec<Option<String>>>,
    pub finished: std::sync::Mutex<Vec<bool>>,
}

impl RecordingStatusSink {
    pub fn statuses(&self) -> Vec<Option<String>> {
        self.statuses.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn finished(&self) -> Vec<bool> {
        self.finished.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

impl StatusSink for RecordingStatusSink {
    fn set_status(&self, status: Option<&str>) {
        if let Ok(mut statuses) = self.statuses.lock() {
            statuses.push(status.map(str::to_string));
        }
    }

    fn on_sync_finished(&self, succeeded: bool) {
        if let Ok(mut finished) = self.finished.lock() {
            finished.push(succeeded);
        }
    }
}

// ============================================================================
// Remote
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    ListCollections(Option<SyncToken>),
    ListItems(String, Option<SyncToken>),
    WriteBatch(String, Vec<String>),
}

/// Remote that serves scripted pages.
///
/// When a script runs out, list calls answer with an empty final page that
/// echoes the requested token, as a server with no changes would.
#[derive(Default)]
pub struct FakeRemote {
    collection_pages: Mutex<VecDeque<RemoteResult<CollectionListResponse>>>,
    item_pages: Mutex<HashMap<String, VecDeque<RemoteResult<ItemListResponse>>>>,
    write_results: Mutex<VecDeque<RemoteResult<()>>>,
    calls: Mutex<Vec<RemoteCall>>,
    /// Notified when `list_collections` is entered
    pub entered: Arc<Notify>,
    /// When set, `list_collections` waits for a permit before answering
    gate: Option<Arc<Notify>>,
    delay: Option<Duration>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block every `list_collections` until `gate` is notified.
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    /// Sleep before answering every `list_collections`.
    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub async fn push_collection_page(&self, page: RemoteResult<CollectionListResponse>) {
        self.collection_pages.lock().await.push_back(page);
    }

    pub async fn push_item_page(&self, collection_uid: &str, page: RemoteResult<ItemListResponse>) {
        self.item_pages
            .lock()
            .await
            .entry(collection_uid.to_string())
            .or_default()
            .push_back(page);
    }

    pub async fn push_write_result(&self, result: RemoteResult<()>) {
        self.write_results.lock().await.push_back(result);
    }

    pub async fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().await.clone()
    }

    pub async fn write_batches(&self) -> Vec<(String, Vec<String>)> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                RemoteCall::WriteBatch(collection, items) => {
                    Some((collection.clone(), items.clone()))
                }
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn list_collections(&self, options: FetchOptions) -> RemoteResult<CollectionListResponse> {
        self.calls
            .lock()
            .await
            .push(RemoteCall::ListCollections(options.token.clone()));
        self.entered.notify_one();

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.collection_pages.lock().await.pop_front() {
            Some(page) => page,
            None => Ok(CollectionListResponse {
                token: options.token,
                done: true,
                ..CollectionListResponse::default()
            }),
        }
    }

    async fn list_items(
        &self,
        collection: &Collection,
        options: FetchOptions,
    ) -> RemoteResult<ItemListResponse> {
        self.calls.lock().await.push(RemoteCall::ListItems(
            collection.uid.clone(),
            options.token.clone(),
        ));

        let scripted = self
            .item_pages
            .lock()
            .await
            .get_mut(&collection.uid)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(page) => page,
            None => Ok(ItemListResponse {
                data: Vec::new(),
                token: options.token,
                done: true,
            }),
        }
    }

    async fn write_item_batch(
        &self,
        collection: &Collection,
        items: Vec<Item>,
        _deps: Vec<Item>,
    ) -> RemoteResult<Vec<Item>> {
        self.calls.lock().await.push(RemoteCall::WriteBatch(
            collection.uid.clone(),
            items.iter().map(|item| item.uid.clone()).collect(),
        ));

        if let Some(Err(err)) = self.write_results.lock().await.pop_front() {
            return Err(err);
        }

        Ok(items
            .into_iter()
            .map(|item| item.with_etag("confirmed"))
            .collect())
    }
}

pub fn network_error() -> RemoteError {
    RemoteError::Network("connection reset".into())
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub remote: Arc<FakeRemote>,
    pub cache: Arc<MemoryCache>,
    pub tokens: Arc<MemoryTokens>,
    pub dirty: Arc<MemoryDirty>,
    pub errors: Arc<RecordingErrorSink>,
    pub status: Arc<RecordingStatusSink>,
    pub event_bus: EventBus,
}

impl Harness {
    pub fn new(remote: FakeRemote) -> Self {
        Self::with_errors(remote, RecordingErrorSink::default())
    }

    pub fn with_errors(remote: FakeRemote, errors: RecordingErrorSink) -> Self {
        Self {
            remote: Arc::new(remote),
            cache: Arc::new(MemoryCache::default()),
            tokens: Arc::new(MemoryTokens::default()),
            dirty: Arc::new(MemoryDirty::default()),
            errors: Arc::new(errors),
            status: Arc::new(RecordingStatusSink::default()),
            event_bus: EventBus::new(256),
        }
    }

    pub fn account(&self) -> AccountHandle {
        let stores = LocalStores::new(
            self.cache.clone(),
            self.tokens.clone(),
            self.dirty.clone(),
        );
        AccountHandle::new("alice", self.remote.clone(), stores)
    }

    pub fn manager(&self) -> SyncManager {
        self.manager_with(SyncConfig::default())
    }

    pub fn manager_with(&self, config: SyncConfig) -> SyncManager {
        SyncManager::new(
            &self.account(),
            config,
            self.errors.clone(),
            self.event_bus.clone(),
        )
        .expect("valid config")
        .with_status_sink(self.status.clone())
    }

    /// Cache `collection` with `count` dirty items named `item-00..`.
    pub async fn stage_dirty(&self, collection: &Collection, count: usize) -> Vec<String> {
        self.cache.upsert_collection(collection).await.unwrap();
        let uids: Vec<String> = (0..count).map(|i| format!("item-{:02}", i)).collect();
        let items: Vec<Item> = uids.iter().map(|uid| Item::new(uid.as_str())).collect();
        self.cache.bulk_set_items(&collection.uid, &items).await.unwrap();
        for uid in &uids {
            self.dirty.mark_dirty(&collection.uid, uid).await.unwrap();
        }
        uids
    }
}
