//! Account identity and the per-account collaborator bundle.

use bridge_traits::{CacheStore, DirtyTracker, RemoteStore, SyncTokenStore};
use core_runtime::CoreConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Stable identifier of an authenticated account (the user name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(username: impl Into<String>) -> Self {
        Self(username.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for AccountId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Durable local state of one account.
#[derive(Clone)]
pub struct LocalStores {
    pub cache: Arc<dyn CacheStore>,
    pub tokens: Arc<dyn SyncTokenStore>,
    pub dirty: Arc<dyn DirtyTracker>,
}

impl LocalStores {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        tokens: Arc<dyn SyncTokenStore>,
        dirty: Arc<dyn DirtyTracker>,
    ) -> Self {
        Self {
            cache,
            tokens,
            dirty,
        }
    }
}

impl From<&CoreConfig> for LocalStores {
    fn from(config: &CoreConfig) -> Self {
        Self::new(
            Arc::clone(&config.cache_store),
            Arc::clone(&config.token_store),
            Arc::clone(&config.dirty_tracker),
        )
    }
}

/// Everything a sync manager needs to know about one signed-in account.
///
/// The remote store carries the authenticated session. The manager never
/// mutates the handle itself.
#[derive(Clone)]
pub struct AccountHandle {
    pub id: AccountId,
    pub remote: Arc<dyn RemoteStore>,
    pub stores: LocalStores,
}

impl AccountHandle {
    pub fn new(id: impl Into<AccountId>, remote: Arc<dyn RemoteStore>, stores: LocalStores) -> Self {
        Self {
            id: id.into(),
            remote,
            stores,
        }
    }
}

impl fmt::Debug for AccountHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
