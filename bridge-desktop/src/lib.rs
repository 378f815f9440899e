//! # Desktop Bridge Implementations
//!
//! Default implementations of the local storage traits for desktop
//! platforms (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `CacheStore` as JSON files under the platform cache directory
//! - `SyncTokenStore` and `DirtyTracker` in one SQLite database per account
//! - `LoggerSink` appending JSON lines to a log file
//!
//! The remote store is not implemented here; hosts provide their own
//! `RemoteStore` on top of the server SDK.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{FileCacheStore, SqliteSyncStateStore};
//! use core_sync::{AccountHandle, LocalStores};
//! use std::sync::Arc;
//!
//! let cache = Arc::new(FileCacheStore::new(FileCacheStore::default_root(), "alice")?);
//! let state = Arc::new(SqliteSyncStateStore::new(db_path).await?);
//! let stores = LocalStores::new(cache, state.clone(), state);
//! let account = AccountHandle::new("alice", remote, stores);
//! ```

mod cache;
mod log_sink;
mod sync_state;

pub use cache::FileCacheStore;
pub use log_sink::FileLogSink;
pub use sync_state::SqliteSyncStateStore;
