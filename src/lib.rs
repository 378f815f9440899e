//! Facade crate for the notes sync engine.
//!
//! Re-exports the workspace crates so hosts can depend on `notes-sync` alone.
//! The `desktop-shims` feature (on by default) adds the file and SQLite
//! backed local stores from `bridge-desktop`.

pub use bridge_traits;
pub use core_runtime;
pub use core_sync;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop;

pub use core_runtime::{CoreConfig, EventBus, SyncConfig};
pub use core_sync::{AccountHandle, AccountId, LocalStores, ManagerRegistry, SyncManager, SyncOutcome};
