//! Per-account manager registry.
//!
//! The composition root owns one [`ManagerRegistry`] and hands it to every
//! caller that wants to sync (UI actions, the background scheduler, setup
//! flows). All callers for one account therefore share one [`SyncManager`]
//! and its busy flag.

use crate::{
    account::{AccountHandle, AccountId},
    error_queue::NonFatalErrorQueue,
    manager::SyncManager,
    Result,
};
use bridge_traits::{Clock, SystemClock};
use core_runtime::config::{CoreConfig, SyncConfig};
use core_runtime::events::{AccountEvent, CoreEvent, EventBus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

struct Entry {
    manager: Arc<SyncManager>,
    errors: Arc<NonFatalErrorQueue>,
}

/// Lazily created, cached [`SyncManager`]s keyed by [`AccountId`].
pub struct ManagerRegistry {
    config: SyncConfig,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    managers: RwLock<HashMap<AccountId, Entry>>,
}

impl ManagerRegistry {
    /// # Errors
    ///
    /// Returns `SyncError::InvalidConfig` if `config` fails validation.
    pub fn new(config: SyncConfig, event_bus: EventBus) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            event_bus,
            clock: Arc::new(SystemClock),
            managers: RwLock::new(HashMap::new()),
        })
    }

    /// Registry using the tunables and clock of a [`CoreConfig`].
    pub fn from_core_config(config: &CoreConfig, event_bus: EventBus) -> Result<Self> {
        Ok(Self::new(config.sync.clone(), event_bus)?.with_clock(Arc::clone(&config.clock)))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Return the account's manager, creating it on first request.
    ///
    /// Later calls with the same account id return the same instance, even if
    /// they pass a different handle.
    pub async fn get_manager(&self, account: &AccountHandle) -> Result<Arc<SyncManager>> {
        if let Some(entry) = self.managers.read().await.get(&account.id) {
            return Ok(Arc::clone(&entry.manager));
        }

        let mut managers = self.managers.write().await;
        // Another caller may have won the race for the write lock
        if let Some(entry) = managers.get(&account.id) {
            return Ok(Arc::clone(&entry.manager));
        }

        let errors = Arc::new(
            NonFatalErrorQueue::new(account.id.clone()).with_event_bus(self.event_bus.clone()),
        );
        let manager = Arc::new(
            SyncManager::new(
                account,
                self.config.clone(),
                errors.clone(),
                self.event_bus.clone(),
            )?
            .with_clock(Arc::clone(&self.clock)),
        );

        managers.insert(
            account.id.clone(),
            Entry {
                manager: Arc::clone(&manager),
                errors,
            },
        );

        info!(account = %account.id, "Created sync manager");
        self.event_bus
            .emit(CoreEvent::Account(AccountEvent::ManagerCreated {
                account: account.id.to_string(),
            }))
            .ok();

        Ok(manager)
    }

    /// Evict the account's manager (logout).
    ///
    /// Returns the evicted instance so the caller can reset its local state.
    /// A sync already running on it finishes normally.
    pub async fn remove_manager(&self, account: &AccountId) -> Option<Arc<SyncManager>> {
        let removed = self.managers.write().await.remove(account)?;

        info!(account = %account, "Removed sync manager");
        self.event_bus
            .emit(CoreEvent::Account(AccountEvent::ManagerRemoved {
                account: account.to_string(),
            }))
            .ok();

        Some(removed.manager)
    }

    /// Non-fatal errors recorded for the account, if it has a manager.
    pub async fn error_queue(&self, account: &AccountId) -> Option<Arc<NonFatalErrorQueue>> {
        self.managers
            .read()
            .await
            .get(account)
            .map(|entry| Arc::clone(&entry.errors))
    }

    pub async fn contains(&self, account: &AccountId) -> bool {
        self.managers.read().await.contains_key(account)
    }

    pub async fn len(&self) -> usize {
        self.managers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.managers.read().await.is_empty()
    }

    /// Wipe the account's local state and evict its manager.
    ///
    /// # Errors
    ///
    /// `SyncError::SyncInProgress` while the account is syncing. The manager
    /// stays registered so the logout can be retried.
    pub async fn logout(&self, account: &AccountId) -> Result<()> {
        let manager = self
            .managers
            .read()
            .await
            .get(account)
            .map(|entry| Arc::clone(&entry.manager));

        let Some(manager) = manager else {
            debug!(account = %account, "Logout for account without manager");
            return Ok(());
        };

        manager.reset_local_state().await?;
        self.remove_manager(account).await;
        Ok(())
    }
}

impl std::fmt::Debug for ManagerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerRegistry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
