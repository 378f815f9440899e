//! # Sync Manager
//!
//! Reconciles one account's local cache with its remote store.
//!
//! ## Overview
//!
//! A sync cycle has two strictly ordered phases:
//!
//! 1. **Push**: every dirty item is read back from the cache and written to
//!    the remote store in fixed-size batches, one collection at a time. A
//!    batch either commits entirely (dirty flags cleared, cache updated with
//!    the server-confirmed items) or aborts the cycle with nothing cleared.
//! 2. **Pull**: the collection list is walked page by page from the stored
//!    global token. Each accepted collection is cached and then its items are
//!    walked page by page from the collection's own token before the next
//!    collection starts. Revoked memberships and deleted collections are
//!    dropped from the cache together with their dirty flags.
//!    Tokens are written back only when the remote returned a different one.
//!
//! ## Concurrency
//!
//! One cycle runs at a time per manager. A `sync()` that arrives while
//! another one is active returns [`SyncOutcome::AlreadySyncing`] at once; it
//! is dropped, not queued. The busy flag is released by a guard, so the
//! manager returns to idle after success, error, panic or cancellation.
//!
//! Local edits (`stage_item`, `unstage_item`), `fetch_collection` and
//! `reset_local_state` hold the same flag and fail with
//! [`SyncError::SyncInProgress`] while a cycle runs.
//!
//! ## Errors
//!
//! Push and pull helpers propagate everything. `sync()` classifies what
//! reaches it (see [`SyncError::disposition`]): transient remote errors are
//! swallowed, permission/HTTP errors are recorded to the [`ErrorSink`], the
//! rest is returned. `sync_strict()` returns every error unchanged.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SyncManager, SyncOutcome};
//!
//! match manager.sync().await? {
//!     SyncOutcome::Completed(report) => println!("fetched {} items", report.fetched_items),
//!     SyncOutcome::Interrupted { message, .. } => println!("will retry: {}", message),
//!     SyncOutcome::AlreadySyncing => {}
//! }
//! ```

use crate::{
    account::{AccountHandle, AccountId},
    error::ErrorDisposition,
    status::{StatusSink, SyncPhase, SyncStatusSnapshot, WatchStatusSink},
    Result, SyncError,
};
use bridge_traits::{
    CacheStore, Clock, Collection, DirtyTracker, ErrorSink, FetchOptions, Item, NonFatalError,
    RemoteErrorKind, RemoteStore, SyncToken, SyncTokenStore, SystemClock,
};
use core_runtime::config::SyncConfig;
use core_runtime::events::{AccountEvent, CoreEvent, EventBus, SyncEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

/// Coordination state of a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Idle,
    Syncing,
}

/// Counters for one completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Global token after the pull; `None` if the store never issued one
    pub token: Option<SyncToken>,
    pub pushed_batches: u64,
    pub pushed_items: u64,
    pub collection_pages: u64,
    pub item_pages: u64,
    pub fetched_collections: u64,
    pub fetched_items: u64,
    /// Collections ignored because their type is not accepted
    pub skipped_collections: u64,
    /// Collections dropped because they were deleted or access was revoked
    pub removed_collections: u64,
    pub duration: Duration,
}

impl SyncReport {
    /// Whether the pull changed anything in the local cache.
    pub fn received_new_data(&self) -> bool {
        self.fetched_collections > 0 || self.fetched_items > 0 || self.removed_collections > 0
    }
}

/// Result of a lenient or strict `sync()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Another sync was active; nothing was done.
    AlreadySyncing,
    /// Push and pull both finished.
    Completed(SyncReport),
    /// Stopped on a suppressed or recorded error; a later sync retries.
    Interrupted {
        disposition: ErrorDisposition,
        message: String,
    },
}

impl SyncOutcome {
    pub fn started(&self) -> bool {
        !matches!(self, SyncOutcome::AlreadySyncing)
    }

    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }

    pub fn token(&self) -> Option<&SyncToken> {
        self.report().and_then(|report| report.token.as_ref())
    }

    pub fn received_new_data(&self) -> bool {
        self.report().is_some_and(SyncReport::received_new_data)
    }
}

/// Releases the busy flag on drop.
struct SyncGuard<'a> {
    manager: &'a SyncManager,
    reports_status: bool,
    succeeded: bool,
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        if self.reports_status {
            self.manager.publish_status(None);
            self.manager.status.on_sync_finished(self.succeeded);
            for sink in &self.manager.status_sinks {
                sink.on_sync_finished(self.succeeded);
            }
        }
        self.manager.syncing.store(false, Ordering::Release);
    }
}

/// Per-account sync coordinator.
pub struct SyncManager {
    account: AccountId,
    config: SyncConfig,
    remote: Arc<dyn RemoteStore>,
    cache: Arc<dyn CacheStore>,
    tokens: Arc<dyn SyncTokenStore>,
    dirty: Arc<dyn DirtyTracker>,
    errors: Arc<dyn ErrorSink>,
    event_bus: EventBus,
    status: WatchStatusSink,
    status_sinks: Vec<Arc<dyn StatusSink>>,
    syncing: AtomicBool,
}

impl SyncManager {
    /// Create a manager for `account`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidConfig` if `config` fails validation.
    pub fn new(
        account: &AccountHandle,
        config: SyncConfig,
        errors: Arc<dyn ErrorSink>,
        event_bus: EventBus,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            account: account.id.clone(),
            config,
            remote: Arc::clone(&account.remote),
            cache: Arc::clone(&account.stores.cache),
            tokens: Arc::clone(&account.stores.tokens),
            dirty: Arc::clone(&account.stores.dirty),
            errors,
            event_bus,
            status: WatchStatusSink::new(Arc::new(SystemClock)),
            status_sinks: Vec::new(),
            syncing: AtomicBool::new(false),
        })
    }

    /// Use `clock` for last-sync timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.status = WatchStatusSink::new(clock);
        self
    }

    /// Also report status transitions to `sink`.
    pub fn with_status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.status_sinks.push(sink);
        self
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn state(&self) -> ManagerState {
        if self.syncing.load(Ordering::Acquire) {
            ManagerState::Syncing
        } else {
            ManagerState::Idle
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.state() == ManagerState::Syncing
    }

    pub fn status_snapshot(&self) -> SyncStatusSnapshot {
        self.status.snapshot()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatusSnapshot> {
        self.status.subscribe()
    }

    // ========================================================================
    // Sync cycle
    // ========================================================================

    /// Run one sync cycle, tolerating transient and recordable errors.
    pub async fn sync(&self) -> Result<SyncOutcome> {
        self.sync_with(false).await
    }

    /// Run one sync cycle and return every error unchanged.
    ///
    /// For setup flows that must decide whether to retry or give up.
    pub async fn sync_strict(&self) -> Result<SyncOutcome> {
        self.sync_with(true).await
    }

    #[instrument(skip(self), fields(account = %self.account))]
    pub async fn sync_with(&self, always_throw_errors: bool) -> Result<SyncOutcome> {
        let Some(mut guard) = self.try_acquire(true) else {
            debug!("Sync already in progress, dropping request");
            self.emit(SyncEvent::Skipped {
                account: self.account.to_string(),
            });
            return Ok(SyncOutcome::AlreadySyncing);
        };

        info!("Starting sync");
        self.emit(SyncEvent::Started {
            account: self.account.to_string(),
        });

        let started = Instant::now();
        match self.run_cycle().await {
            Ok(mut report) => {
                report.duration = started.elapsed();
                guard.succeeded = true;

                info!(
                    pushed_items = report.pushed_items,
                    fetched_collections = report.fetched_collections,
                    fetched_items = report.fetched_items,
                    removed_collections = report.removed_collections,
                    duration_ms = report.duration.as_millis() as u64,
                    "Sync completed"
                );
                self.emit(SyncEvent::Completed {
                    account: self.account.to_string(),
                    pushed_items: report.pushed_items,
                    fetched_collections: report.fetched_collections,
                    fetched_items: report.fetched_items,
                    removed_collections: report.removed_collections,
                    duration_ms: report.duration.as_millis() as u64,
                });

                Ok(SyncOutcome::Completed(report))
            }
            Err(err) => self.handle_failure(err, always_throw_errors).await,
        }
    }

    async fn run_cycle(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        self.publish_status(Some(SyncPhase::PushingChanges));
        self.push_all(&mut report).await?;

        self.publish_status(Some(SyncPhase::PullingChanges));
        report.token = self.fetch_all_collections(&mut report).await?;

        Ok(report)
    }

    async fn handle_failure(
        &self,
        err: SyncError,
        always_throw_errors: bool,
    ) -> Result<SyncOutcome> {
        let disposition = if always_throw_errors {
            ErrorDisposition::Fatal
        } else {
            err.disposition()
        };

        match disposition {
            ErrorDisposition::Suppress => {
                warn!(error = %err, "Sync interrupted by transient error");
                self.emit(SyncEvent::Deferred {
                    account: self.account.to_string(),
                    message: err.to_string(),
                    recorded: false,
                });
            }
            ErrorDisposition::Record => {
                let record = match err.as_remote() {
                    Some(remote) => NonFatalError::from(remote),
                    None => NonFatalError::new(RemoteErrorKind::Unclassified, err.to_string()),
                };
                if let Err(record_err) = self.errors.record_non_fatal(record).await {
                    error!(error = %record_err, "Failed to record non-fatal sync error");
                }
                self.emit(SyncEvent::Deferred {
                    account: self.account.to_string(),
                    message: err.to_string(),
                    recorded: true,
                });
            }
            ErrorDisposition::Fatal => {
                error!(error = %err, strict = always_throw_errors, "Sync failed");
                self.emit(SyncEvent::Failed {
                    account: self.account.to_string(),
                    message: err.to_string(),
                });
                return Err(err);
            }
        }

        Ok(SyncOutcome::Interrupted {
            disposition,
            message: err.to_string(),
        })
    }

    // ========================================================================
    // Push phase
    // ========================================================================

    async fn push_all(&self, report: &mut SyncReport) -> Result<()> {
        let dirty = self.dirty.list_by_collection().await?;

        for (collection_uid, item_uids) in dirty {
            if item_uids.is_empty() {
                continue;
            }

            let collection = self
                .cache
                .get_collection(&collection_uid)
                .await?
                .ok_or_else(|| SyncError::CollectionNotCached {
                    collection_uid: collection_uid.clone(),
                })?;

            let item_uids: Vec<String> = item_uids.into_iter().collect();
            for (batch, chunk) in item_uids.chunks(self.config.batch_size).enumerate() {
                self.push_batch(&collection, chunk).await?;
                report.pushed_batches += 1;
                report.pushed_items += chunk.len() as u64;

                debug!(
                    collection = %collection_uid,
                    batch,
                    items = chunk.len(),
                    "Pushed batch"
                );
            }
        }

        Ok(())
    }

    async fn push_batch(&self, collection: &Collection, item_uids: &[String]) -> Result<()> {
        let mut items = Vec::with_capacity(item_uids.len());
        for item_uid in item_uids {
            let item = self
                .cache
                .get_item(&collection.uid, item_uid)
                .await?
                .ok_or_else(|| SyncError::ItemNotCached {
                    collection_uid: collection.uid.clone(),
                    item_uid: item_uid.clone(),
                })?;
            items.push(item);
        }

        let confirmed = self
            .remote
            .write_item_batch(collection, items, Vec::new())
            .await?;

        self.cache.bulk_set_items(&collection.uid, &confirmed).await?;
        for item_uid in item_uids {
            self.dirty.clear(&collection.uid, item_uid).await?;
        }

        Ok(())
    }

    // ========================================================================
    // Pull phase
    // ========================================================================

    async fn fetch_all_collections(&self, report: &mut SyncReport) -> Result<Option<SyncToken>> {
        let stored = self.tokens.get_global_token().await?;
        let mut token = stored.clone();

        loop {
            let page = self
                .remote
                .list_collections(FetchOptions::new(token.clone(), self.config.page_limit))
                .await?;
            report.collection_pages += 1;

            debug!(
                collections = page.data.len(),
                removed = page.removed_memberships.len(),
                done = page.done,
                "Fetched collection page"
            );

            for collection in &page.data {
                if !self.config.accepts(collection.collection_type()) {
                    debug!(
                        collection = %collection.uid,
                        collection_type = %collection.collection_type(),
                        "Ignoring collection of unaccepted type"
                    );
                    report.skipped_collections += 1;
                    continue;
                }

                if collection.deleted {
                    self.drop_collection(&collection.uid).await?;
                    report.removed_collections += 1;
                    debug!(collection = %collection.uid, "Dropped deleted collection");
                    continue;
                }

                self.cache.upsert_collection(collection).await?;
                report.fetched_collections += 1;
                self.pull_collection(collection, report).await?;
            }

            for removed in &page.removed_memberships {
                self.drop_collection(&removed.uid).await?;
                report.removed_collections += 1;
                debug!(collection = %removed.uid, "Dropped collection after membership removal");
            }

            token = page.token;
            if page.done {
                break;
            }
        }

        if token != stored {
            self.tokens.set_global_token(token.as_ref()).await?;
            debug!("Advanced global sync token");
        }

        Ok(token)
    }

    /// Remove a collection the account can no longer see.
    ///
    /// Its pending edits can never be pushed, so their flags go with it.
    async fn drop_collection(&self, collection_uid: &str) -> Result<()> {
        self.cache.remove_collection(collection_uid).await?;
        self.dirty.clear_collection(collection_uid).await?;
        Ok(())
    }

    async fn pull_collection(&self, collection: &Collection, report: &mut SyncReport) -> Result<()> {
        let stored = self.tokens.get_collection_token(&collection.uid).await?;
        let mut token = stored.clone();

        loop {
            let page = self
                .remote
                .list_items(collection, FetchOptions::new(token.clone(), self.config.page_limit))
                .await?;
            report.item_pages += 1;

            if !page.data.is_empty() {
                self.cache.bulk_set_items(&collection.uid, &page.data).await?;
                report.fetched_items += page.data.len() as u64;
            }

            token = page.token;
            if page.done {
                break;
            }
        }

        if token != stored {
            self.tokens
                .set_collection_token(&collection.uid, token.as_ref())
                .await?;
            debug!(collection = %collection.uid, "Advanced collection sync token");
        }

        Ok(())
    }

    /// Pull the items of one collection outside a full cycle.
    ///
    /// Returns the number of items fetched.
    ///
    /// # Errors
    ///
    /// `SyncError::SyncInProgress` if a sync is running; remote and storage
    /// errors are returned unclassified.
    #[instrument(skip(self, collection), fields(account = %self.account, collection = %collection.uid))]
    pub async fn fetch_collection(&self, collection: &Collection) -> Result<u64> {
        let _guard = self.acquire_or_busy()?;

        let mut report = SyncReport::default();
        self.pull_collection(collection, &mut report).await?;
        Ok(report.fetched_items)
    }

    // ========================================================================
    // Local edits
    // ========================================================================

    /// Store a locally edited item and mark it for the next push.
    ///
    /// # Errors
    ///
    /// `SyncError::SyncInProgress` while a sync is running, since its pull
    /// would overwrite the cached edit. `SyncError::CollectionNotCached` for
    /// an unknown collection.
    pub async fn stage_item(&self, collection_uid: &str, item: Item) -> Result<()> {
        let _guard = self.acquire_or_busy()?;

        if self.cache.get_collection(collection_uid).await?.is_none() {
            return Err(SyncError::CollectionNotCached {
                collection_uid: collection_uid.to_string(),
            });
        }

        self.cache
            .bulk_set_items(collection_uid, std::slice::from_ref(&item))
            .await?;
        self.dirty.mark_dirty(collection_uid, &item.uid).await?;

        debug!(
            account = %self.account,
            collection = %collection_uid,
            item = %item.uid,
            "Staged local edit"
        );
        Ok(())
    }

    /// Forget a pending edit without pushing it.
    ///
    /// # Errors
    ///
    /// `SyncError::SyncInProgress` while a sync is running.
    pub async fn unstage_item(&self, collection_uid: &str, item_uid: &str) -> Result<()> {
        let _guard = self.acquire_or_busy()?;
        self.dirty.clear(collection_uid, item_uid).await?;
        Ok(())
    }

    /// Number of items waiting to be pushed.
    pub async fn pending_changes(&self) -> Result<usize> {
        let dirty = self.dirty.list_by_collection().await?;
        Ok(dirty.values().map(|items| items.len()).sum())
    }

    /// Wipe cache, tokens and dirty flags (logout).
    ///
    /// # Errors
    ///
    /// `SyncError::SyncInProgress` while a sync is running.
    #[instrument(skip(self), fields(account = %self.account))]
    pub async fn reset_local_state(&self) -> Result<()> {
        let _guard = self.acquire_or_busy()?;

        self.cache.clear_all().await?;
        self.tokens.clear_all().await?;
        self.dirty.clear_all().await?;

        info!("Cleared local sync state");
        self.event_bus
            .emit(CoreEvent::Account(AccountEvent::LocalStateCleared {
                account: self.account.to_string(),
            }))
            .ok();
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn try_acquire(&self, reports_status: bool) -> Option<SyncGuard<'_>> {
        self.syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;

        if reports_status {
            self.status.on_sync_started();
            for sink in &self.status_sinks {
                sink.on_sync_started();
            }
        }

        Some(SyncGuard {
            manager: self,
            reports_status,
            succeeded: false,
        })
    }

    fn acquire_or_busy(&self) -> Result<SyncGuard<'_>> {
        self.try_acquire(false)
            .ok_or_else(|| SyncError::SyncInProgress {
                account: self.account.to_string(),
            })
    }

    fn publish_status(&self, phase: Option<SyncPhase>) {
        let status = phase.map(|phase| phase.as_str());
        self.status.set_status(status);
        for sink in &self.status_sinks {
            sink.set_status(status);
        }
        self.emit(SyncEvent::StatusChanged {
            account: self.account.to_string(),
            status: status.map(str::to_string),
        });
    }

    fn emit(&self, event: SyncEvent) {
        self.event_bus.emit(CoreEvent::Sync(event)).ok();
    }
}

impl std::fmt::Debug for SyncManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncManager")
            .field("account", &self.account)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
