//! Local Storage Abstractions
//!
//! Durable per-account state the sync engine reads and writes:
//! - [`CacheStore`]: cached collection and item snapshots
//! - [`SyncTokenStore`]: last-seen sync tokens, global and per collection
//! - [`DirtyTracker`]: items with local edits not yet pushed
//! - [`ErrorSink`]: queue of non-fatal errors waiting to be shown to the user
//!
//! Hosts choose the mechanics (files, SQLite, browser storage). Every
//! implementation must be safe to share across tasks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::error::{RemoteError, RemoteErrorKind, Result};
use crate::remote::{Collection, Item, SyncToken};

/// Dirty item uids grouped by collection uid.
pub type DirtyIndex = BTreeMap<String, BTreeSet<String>>;

/// Cached collection and item snapshots.
///
/// A cached collection always has an item map, possibly empty. Removing a
/// collection removes its item map with it.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Insert or replace a collection, creating an empty item map if missing.
    async fn upsert_collection(&self, collection: &Collection) -> Result<()>;

    /// Remove a collection and its item map. Removing an absent collection is
    /// not an error.
    async fn remove_collection(&self, collection_uid: &str) -> Result<()>;

    async fn get_collection(&self, collection_uid: &str) -> Result<Option<Collection>>;

    async fn list_collections(&self) -> Result<Vec<Collection>>;

    /// Insert or replace several items of one collection in a single step.
    async fn bulk_set_items(&self, collection_uid: &str, items: &[Item]) -> Result<()>;

    async fn get_item(&self, collection_uid: &str, item_uid: &str) -> Result<Option<Item>>;

    async fn list_items(&self, collection_uid: &str) -> Result<Vec<Item>>;

    /// Drop every cached collection and item (logout).
    async fn clear_all(&self) -> Result<()>;
}

/// Durable storage of the last observed sync tokens.
#[async_trait]
pub trait SyncTokenStore: Send + Sync {
    async fn get_collection_token(&self, collection_uid: &str) -> Result<Option<SyncToken>>;

    async fn set_collection_token(
        &self,
        collection_uid: &str,
        token: Option<&SyncToken>,
    ) -> Result<()>;

    async fn get_global_token(&self) -> Result<Option<SyncToken>>;

    async fn set_global_token(&self, token: Option<&SyncToken>) -> Result<()>;

    /// Forget every token (logout).
    async fn clear_all(&self) -> Result<()>;
}

/// Durable set of (collection, item) pairs with unpushed local edits.
#[async_trait]
pub trait DirtyTracker: Send + Sync {
    /// Dirty item uids grouped by collection. Collections with no dirty items
    /// are omitted.
    async fn list_by_collection(&self) -> Result<DirtyIndex>;

    async fn mark_dirty(&self, collection_uid: &str, item_uid: &str) -> Result<()>;

    async fn clear(&self, collection_uid: &str, item_uid: &str) -> Result<()>;

    async fn is_dirty(&self, collection_uid: &str, item_uid: &str) -> Result<bool> {
        Ok(self
            .list_by_collection()
            .await?
            .get(collection_uid)
            .is_some_and(|items| items.contains(item_uid)))
    }

    /// Forget the dirty flags of one collection (collection gone remotely).
    async fn clear_collection(&self, collection_uid: &str) -> Result<()> {
        let index = self.list_by_collection().await?;
        if let Some(items) = index.get(collection_uid) {
            for item_uid in items {
                self.clear(collection_uid, item_uid).await?;
            }
        }
        Ok(())
    }

    /// Forget every dirty flag (logout).
    async fn clear_all(&self) -> Result<()>;
}

/// A remote failure recorded for later display to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonFatalError {
    pub id: Uuid,
    pub kind: RemoteErrorKind,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

impl NonFatalError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            recorded_at: Utc::now(),
        }
    }
}

impl From<&RemoteError> for NonFatalError {
    fn from(error: &RemoteError) -> Self {
        Self::new(error.kind(), error.to_string())
    }
}

/// Receiver of non-fatal errors.
#[async_trait]
pub trait ErrorSink: Send + Sync {
    async fn record_non_fatal(&self, error: NonFatalError) -> Result<()>;
}
