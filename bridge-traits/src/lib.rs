//! # Host Bridge Traits
//!
//! Collaborator contracts the sync engine depends on but does not implement.
//!
//! ## Overview
//!
//! The engine reconciles a local cache against a remote encrypted store. It
//! never talks to the network or the disk directly; instead each capability
//! is a trait that a host (desktop, mobile, web) supplies an adapter for.
//!
//! ## Traits
//!
//! ### Remote
//! - [`RemoteStore`](remote::RemoteStore) - Paginated collection/item listing and batched item writes
//!
//! ### Local State
//! - [`CacheStore`](storage::CacheStore) - Cached collection and item snapshots
//! - [`SyncTokenStore`](storage::SyncTokenStore) - Last-seen sync tokens
//! - [`DirtyTracker`](storage::DirtyTracker) - Items with unpushed local edits
//! - [`ErrorSink`](storage::ErrorSink) - Non-fatal errors for later display
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! Local storage adapters report [`BridgeError`](error::BridgeError). The
//! remote store reports the closed [`RemoteError`](error::RemoteError) set,
//! which the engine classifies at a single point.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so adapters can be shared across
//! async tasks behind `Arc`.
//!
//! ## Example
//!
//! ```ignore
//! use bridge_traits::remote::{Collection, FetchOptions, Item, ItemListResponse, RemoteStore};
//! use bridge_traits::error::RemoteResult;
//! use async_trait::async_trait;
//!
//! pub struct EtebaseRemote { /* session */ }
//!
//! #[async_trait]
//! impl RemoteStore for EtebaseRemote {
//!     async fn list_items(&self, collection: &Collection, options: FetchOptions)
//!         -> RemoteResult<ItemListResponse> {
//!         todo!()
//!     }
//!     // ...
//! }
//! ```

pub mod error;
pub mod remote;
pub mod storage;
pub mod time;

pub use error::{BridgeError, RemoteError, RemoteErrorKind};

// Re-export commonly used types
pub use remote::{
    Collection, CollectionListResponse, CollectionMeta, FetchOptions, Item, ItemListResponse,
    ItemMeta, RemoteStore, RemovedMembership, SyncToken,
};
pub use storage::{CacheStore, DirtyIndex, DirtyTracker, ErrorSink, NonFatalError, SyncTokenStore};
pub use time::{Clock, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
