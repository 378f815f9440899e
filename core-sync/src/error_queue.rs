//! In-memory queue of non-fatal sync errors.
//!
//! Permission and HTTP failures do not abort the caller of `sync()`; they are
//! queued here so the UI can show each one once and then drop it.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{ErrorSink, NonFatalError};
use core_runtime::events::{AccountEvent, CoreEvent, EventBus};
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::warn;

use crate::account::AccountId;

pub struct NonFatalErrorQueue {
    account: AccountId,
    entries: Mutex<VecDeque<NonFatalError>>,
    event_bus: Option<EventBus>,
}

impl NonFatalErrorQueue {
    pub fn new(account: AccountId) -> Self {
        Self {
            account,
            entries: Mutex::new(VecDeque::new()),
            event_bus: None,
        }
    }

    /// Announce every recorded error on `event_bus`.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Remove and return the most recently recorded error.
    pub async fn pop_latest(&self) -> Option<NonFatalError> {
        self.entries.lock().await.pop_back()
    }

    pub async fn peek_latest(&self) -> Option<NonFatalError> {
        self.entries.lock().await.back().cloned()
    }

    /// Remove every queued error, oldest first.
    pub async fn drain(&self) -> Vec<NonFatalError> {
        self.entries.lock().await.drain(..).collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

#[async_trait]
impl ErrorSink for NonFatalErrorQueue {
    async fn record_non_fatal(&self, error: NonFatalError) -> BridgeResult<()> {
        warn!(
            account = %self.account,
            kind = ?error.kind,
            error_id = %error.id,
            "Recorded non-fatal sync error: {}",
            error.message
        );

        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Account(AccountEvent::NonFatalErrorRecorded {
                account: self.account.to_string(),
                error_id: error.id.to_string(),
                message: error.message.clone(),
            }))
            .ok();
        }

        self.entries.lock().await.push_back(error);
        Ok(())
    }
}
