//! # Event Bus System
//!
//! Broadcasts typed engine events over `tokio::sync::broadcast` so UI layers,
//! background runners and tests can observe sync progress without holding a
//! reference to the manager.
//!
//! ## Overview
//!
//! - **Event Types**: [`CoreEvent`] wraps [`SyncEvent`] (one sync cycle) and
//!   [`AccountEvent`] (manager lifecycle, local resets, recorded errors)
//! - **EventBus**: cloneable sender side
//! - **EventStream**: receiver with an optional filter
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Sync(SyncEvent::Started {
//!         account: "alice".to_string(),
//!     }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert!(matches!(event, CoreEvent::Sync(SyncEvent::Started { .. })));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; keep reading.
//! - **`RecvError::Closed`**: every sender is gone; treat it as shutdown.
//!
//! Emitting with no subscribers returns an error. Publishers ignore it with
//! `.ok()`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Sync cycle events
    Sync(SyncEvent),
    /// Per-account lifecycle events
    Account(AccountEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Account(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Account(AccountEvent::NonFatalErrorRecorded { .. }) => {
                EventSeverity::Warning
            }
            CoreEvent::Sync(SyncEvent::Deferred { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Account(AccountEvent::LocalStateCleared { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// Account the event belongs to.
    pub fn account(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.account(),
            CoreEvent::Account(e) => e.account(),
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events emitted by one sync cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// The manager left `Idle`.
    Started { account: String },
    /// Status string for progress indicators; `None` means idle.
    StatusChanged {
        account: String,
        status: Option<String>,
    },
    /// Push and pull both finished.
    Completed {
        account: String,
        pushed_items: u64,
        fetched_collections: u64,
        fetched_items: u64,
        removed_collections: u64,
        duration_ms: u64,
    },
    /// A sync was requested while another one was running.
    Skipped { account: String },
    /// A sync stopped on a suppressed or recorded error. Retry later.
    Deferred {
        account: String,
        message: String,
        /// Whether the error was queued for display to the user.
        recorded: bool,
    },
    /// A sync stopped on an error that was propagated to the caller.
    Failed {
        account: String,
        message: String,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::StatusChanged { .. } => "Sync status changed",
            SyncEvent::Completed { .. } => "Sync completed successfully",
            SyncEvent::Skipped { .. } => "Sync already in progress",
            SyncEvent::Deferred { .. } => "Sync deferred",
            SyncEvent::Failed { .. } => "Sync failed",
        }
    }

    fn account(&self) -> &str {
        match self {
            SyncEvent::Started { account }
            | SyncEvent::StatusChanged { account, .. }
            | SyncEvent::Completed { account, .. }
            | SyncEvent::Skipped { account }
            | SyncEvent::Deferred { account, .. }
            | SyncEvent::Failed { account, .. } => account,
        }
    }
}

// ============================================================================
// Account Events
// ============================================================================

/// Events about an account's manager and local state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AccountEvent {
    /// A manager was created and cached for the account.
    ManagerCreated { account: String },
    /// The cached manager was evicted (logout).
    ManagerRemoved { account: String },
    /// Cache, tokens and dirty flags were wiped.
    LocalStateCleared { account: String },
    /// A remote error was queued for display.
    NonFatalErrorRecorded {
        account: String,
        error_id: String,
        message: String,
    },
}

impl AccountEvent {
    fn description(&self) -> &str {
        match self {
            AccountEvent::ManagerCreated { .. } => "Sync manager created",
            AccountEvent::ManagerRemoved { .. } => "Sync manager removed",
            AccountEvent::LocalStateCleared { .. } => "Local sync state cleared",
            AccountEvent::NonFatalErrorRecorded { .. } => "Non-fatal error recorded",
        }
    }

    fn account(&self) -> &str {
        match self {
            AccountEvent::ManagerCreated { account }
            | AccountEvent::ManagerRemoved { account }
            | AccountEvent::LocalStateCleared { account }
            | AccountEvent::NonFatalErrorRecorded { account, .. } => account,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Cloneable broadcast sender for [`CoreEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// A subscriber that falls behind by more than `capacity` events receives
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional filter.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let alice_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| event.account() == "alice");
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without waiting.
    ///
    /// Returns `None` if no matching event is currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
