//! Remote Collection/Item Store
//!
//! Contract for the encrypted store that holds an account's collections and
//! items. The store is paginated by opaque sync tokens and accepts batched
//! item writes with optimistic-concurrency semantics.
//!
//! Cryptography, key management and HTTP transport live behind this trait;
//! the sync engine only sees decrypted-enough metadata plus opaque payloads.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RemoteResult;

/// Opaque server-issued cursor ("stoken").
///
/// Tokens are compared for equality only. `Debug` output is redacted so
/// tokens never end up in logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncToken(String);

impl SyncToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SyncToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SyncToken([REDACTED])")
    }
}

impl From<&str> for SyncToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SyncToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Collection metadata as exposed by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMeta {
    /// Declared collection type, matched against the accepted-type allow-list.
    #[serde(rename = "type")]
    pub collection_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Modification time in Unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<i64>,
}

impl CollectionMeta {
    pub fn new(collection_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            collection_type: collection_type.into(),
            name: name.into(),
            description: None,
            color: None,
            mtime: None,
        }
    }
}

/// A typed container of items (a notebook).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub meta: CollectionMeta,
    #[serde(default)]
    pub deleted: bool,
    /// Encrypted serialized handle, opaque to the sync engine.
    #[serde(default)]
    pub payload: Vec<u8>,
}

impl Collection {
    pub fn new(uid: impl Into<String>, meta: CollectionMeta) -> Self {
        Self {
            uid: uid.into(),
            etag: None,
            meta,
            deleted: false,
            payload: Vec::new(),
        }
    }

    pub fn collection_type(&self) -> &str {
        &self.meta.collection_type
    }
}

/// Item metadata as exposed by the remote store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Modification time in Unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<i64>,
}

/// A note belonging to exactly one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default)]
    pub meta: ItemMeta,
    /// Tombstone flag. Deleted items are kept so deletions propagate.
    #[serde(default)]
    pub deleted: bool,
    /// Encrypted serialized handle, opaque to the sync engine.
    #[serde(default)]
    pub payload: Vec<u8>,
}

impl Item {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            etag: None,
            meta: ItemMeta::default(),
            deleted: false,
            payload: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.meta.name = Some(name.into());
        self
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }
}

/// Pagination options for list calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Resume point; `None` lists from the beginning.
    pub token: Option<SyncToken>,
    /// Maximum entries per page.
    pub limit: usize,
}

impl FetchOptions {
    pub fn new(token: Option<SyncToken>, limit: usize) -> Self {
        Self { token, limit }
    }
}

/// A collection whose membership was revoked for this account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedMembership {
    pub uid: String,
}

/// One page of the collection list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionListResponse {
    pub data: Vec<Collection>,
    pub removed_memberships: Vec<RemovedMembership>,
    pub token: Option<SyncToken>,
    pub done: bool,
}

/// One page of a collection's item list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemListResponse {
    pub data: Vec<Item>,
    pub token: Option<SyncToken>,
    pub done: bool,
}

/// Remote collection/item store for one authenticated account.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::remote::{FetchOptions, RemoteStore};
///
/// async fn count_collections(remote: &dyn RemoteStore) -> usize {
///     let page = remote.list_collections(FetchOptions::new(None, 20)).await.unwrap();
///     page.data.len()
/// }
/// ```
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List collections changed since `options.token`.
    async fn list_collections(&self, options: FetchOptions)
        -> RemoteResult<CollectionListResponse>;

    /// List items of `collection` changed since `options.token`.
    async fn list_items(
        &self,
        collection: &Collection,
        options: FetchOptions,
    ) -> RemoteResult<ItemListResponse>;

    /// Atomically write `items` to `collection`.
    ///
    /// `deps` are items whose etags must still match for the write to
    /// succeed. Returns the items as confirmed by the server (new etags).
    /// Either every item is written or none is.
    async fn write_item_batch(
        &self,
        collection: &Collection,
        items: Vec<Item>,
        deps: Vec<Item>,
    ) -> RemoteResult<Vec<Item>>;
}
