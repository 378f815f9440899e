//! # Incremental Sync Engine
//!
//! Reconciles a notes account's local cache with its remote encrypted store.
//!
//! ## Overview
//!
//! - Push locally edited items in fixed-size batches
//! - Pull changed collections and their items page by page from sync tokens
//! - Keep one coordinator per account and never run two cycles at once
//! - Classify remote failures into suppressed, recorded and fatal
//!
//! ## Components
//!
//! - **Sync Manager** (`manager`): one push-then-pull cycle with the busy guard
//! - **Registry** (`registry`): lazily created manager per account
//! - **Status** (`status`): status strings and the UI snapshot
//! - **Error Queue** (`error_queue`): non-fatal errors waiting for display
//! - **Background** (`background`): budgeted and scheduled syncs
//! - **Account** (`account`): account id and per-account collaborators

pub mod account;
pub mod background;
pub mod error;
pub mod error_queue;
pub mod manager;
pub mod registry;
pub mod status;

pub use account::{AccountHandle, AccountId, LocalStores};
pub use background::{
    run_background_sync, BackgroundFetchResult, BackgroundSyncHandle, BackgroundSyncScheduler,
};
pub use error::{ErrorDisposition, Result, SyncError};
pub use error_queue::NonFatalErrorQueue;
pub use manager::{ManagerState, SyncManager, SyncOutcome, SyncReport};
pub use registry::ManagerRegistry;
pub use status::{StatusSink, SyncPhase, SyncStatusSnapshot, WatchStatusSink};
