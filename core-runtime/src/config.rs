//! # Core Configuration Module
//!
//! Provides configuration management for the notes sync engine.
//!
//! ## Overview
//!
//! Two layers:
//! - [`SyncConfig`]: plain tunables (batch size, page limit, accepted
//!   collection types, background budget and interval).
//! - [`CoreConfig`]: the composition root's view, holding the durable
//!   collaborators the engine needs plus a `SyncConfig`. Built with
//!   [`CoreConfigBuilder`], which fails fast when a required bridge is
//!   missing.
//!
//! ## Required Dependencies
//!
//! - `CacheStore` - Cached collection and item snapshots
//! - `SyncTokenStore` - Last-seen sync tokens
//! - `DirtyTracker` - Pending local edits
//!
//! ## Optional Dependencies
//!
//! - `Clock` - Defaults to [`SystemClock`]
//! - `LoggerSink` - Mirror logs to the host
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, SyncConfig};
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .cache_store(Arc::new(cache))
//!     .token_store(state.clone())
//!     .dirty_tracker(state)
//!     .sync(SyncConfig::default().with_batch_size(10))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{CacheStore, Clock, DirtyTracker, LoggerSink, SyncTokenStore, SystemClock};
use std::sync::Arc;
use std::time::Duration;

/// Collection type of a markdown notebook.
pub const DEFAULT_COLLECTION_TYPE: &str = "etebase.md.note";

/// Items per push batch, also the default page size for list calls.
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Platforms give background fetch roughly 30 seconds; stay under it.
pub const DEFAULT_BACKGROUND_BUDGET: Duration = Duration::from_secs(27);

pub const BACKGROUND_PLATFORM_LIMIT: Duration = Duration::from_secs(30);

pub const DEFAULT_BACKGROUND_INTERVAL: Duration = Duration::from_secs(4 * 60 * 60);

pub const MIN_BACKGROUND_INTERVAL: Duration = Duration::from_secs(15 * 60);

const MAX_BATCH_SIZE: usize = 1000;

/// Tunables for one sync manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Maximum items per push batch
    pub batch_size: usize,
    /// `limit` sent with every list call
    pub page_limit: usize,
    /// Collection types that are cached and pulled; others are ignored
    pub accepted_collection_types: Vec<String>,
    /// Wall-clock budget for a background sync
    pub background_budget: Duration,
    /// Period of the background sync scheduler
    pub background_interval: Duration,
    /// Buffer size of the event bus
    pub event_buffer_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            page_limit: DEFAULT_BATCH_SIZE,
            accepted_collection_types: vec![DEFAULT_COLLECTION_TYPE.to_string()],
            background_budget: DEFAULT_BACKGROUND_BUDGET,
            background_interval: DEFAULT_BACKGROUND_INTERVAL,
            event_buffer_size: crate::events::DEFAULT_EVENT_BUFFER_SIZE,
        }
    }
}

impl SyncConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_page_limit(mut self, page_limit: usize) -> Self {
        self.page_limit = page_limit;
        self
    }

    /// Replace the accepted collection types.
    pub fn with_accepted_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accepted_collection_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_background_budget(mut self, budget: Duration) -> Self {
        self.background_budget = budget;
        self
    }

    pub fn with_background_interval(mut self, interval: Duration) -> Self {
        self.background_interval = interval;
        self
    }

    pub fn with_event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }

    pub fn accepts(&self, collection_type: &str) -> bool {
        self.accepted_collection_types
            .iter()
            .any(|accepted| accepted == collection_type)
    }

    /// Validates the tunables.
    ///
    /// This checks:
    /// - Batch size and page limit are in `1..=1000`
    /// - At least one collection type is accepted
    /// - The background budget is non-zero and under the platform limit
    /// - The background interval is at least 15 minutes
    /// - The event buffer is non-zero
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(Error::Config(format!(
                "Batch size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, self.batch_size
            )));
        }

        if self.page_limit == 0 || self.page_limit > MAX_BATCH_SIZE {
            return Err(Error::Config(format!(
                "Page limit must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, self.page_limit
            )));
        }

        if self.accepted_collection_types.is_empty() {
            return Err(Error::Config(
                "At least one accepted collection type is required".to_string(),
            ));
        }

        if self.background_budget.is_zero() {
            return Err(Error::Config(
                "Background budget must be greater than zero".to_string(),
            ));
        }

        if self.background_budget >= BACKGROUND_PLATFORM_LIMIT {
            return Err(Error::Config(format!(
                "Background budget must stay under the {}s platform limit",
                BACKGROUND_PLATFORM_LIMIT.as_secs()
            )));
        }

        if self.background_interval < MIN_BACKGROUND_INTERVAL {
            return Err(Error::Config(format!(
                "Background interval must be at least {} minutes",
                MIN_BACKGROUND_INTERVAL.as_secs() / 60
            )));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Composition-root configuration.
///
/// Holds the durable collaborators for the signed-in account plus the sync
/// tunables. Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Cached collection and item snapshots (required)
    pub cache_store: Arc<dyn CacheStore>,

    /// Last-seen sync tokens (required)
    pub token_store: Arc<dyn SyncTokenStore>,

    /// Pending local edits (required)
    pub dirty_tracker: Arc<dyn DirtyTracker>,

    /// Time source
    pub clock: Arc<dyn Clock>,

    /// Optional host log sink
    pub logger_sink: Option<Arc<dyn LoggerSink>>,

    /// Sync tunables
    pub sync: SyncConfig,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("cache_store", &"CacheStore { ... }")
            .field("token_store", &"SyncTokenStore { ... }")
            .field("dirty_tracker", &"DirtyTracker { ... }")
            .field(
                "logger_sink",
                &self.logger_sink.as_ref().map(|_| "LoggerSink { ... }"),
            )
            .field("sync", &self.sync)
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        self.sync.validate()
    }
}

fn capability_missing(capability: &str, purpose: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{} implementation is required for {}. \
             Desktop: use the adapters from bridge-desktop. \
             Mobile/Web: inject a platform-native adapter.",
            capability, purpose
        ),
    }
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    cache_store: Option<Arc<dyn CacheStore>>,
    token_store: Option<Arc<dyn SyncTokenStore>>,
    dirty_tracker: Option<Arc<dyn DirtyTracker>>,
    clock: Option<Arc<dyn Clock>>,
    logger_sink: Option<Arc<dyn LoggerSink>>,
    sync: Option<SyncConfig>,
}

impl CoreConfigBuilder {
    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    pub fn token_store(mut self, store: Arc<dyn SyncTokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    pub fn dirty_tracker(mut self, tracker: Arc<dyn DirtyTracker>) -> Self {
        self.dirty_tracker = Some(tracker);
        self
    }

    /// Override the time source (tests, host-provided clocks).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    pub fn sync(mut self, sync: SyncConfig) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Returns
    ///
    /// Returns `Ok(CoreConfig)` on success, or an error if:
    /// - A required bridge is missing (`CacheStore`, `SyncTokenStore`, `DirtyTracker`)
    /// - A sync tunable is out of range
    pub fn build(self) -> Result<CoreConfig> {
        let cache_store = self
            .cache_store
            .ok_or_else(|| capability_missing("CacheStore", "offline access to notes"))?;

        let token_store = self
            .token_store
            .ok_or_else(|| capability_missing("SyncTokenStore", "incremental pulls"))?;

        let dirty_tracker = self
            .dirty_tracker
            .ok_or_else(|| capability_missing("DirtyTracker", "pushing local edits"))?;

        let config = CoreConfig {
            cache_store,
            token_store,
            dirty_tracker,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            logger_sink: self.logger_sink,
            sync: self.sync.unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }
}
