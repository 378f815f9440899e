//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the sync engine crates:
//! - Logging and tracing setup
//! - Configuration and fail-fast validation
//! - Event bus
//!
//! ## Overview
//!
//! Nothing here knows how to sync. This crate fixes the conventions (how the
//! engine logs, how it is configured, how it reports progress) that
//! `core-sync` and the host bridges build on.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder, SyncConfig};
pub use error::{Error, Result};
pub use events::{AccountEvent, CoreEvent, EventBus, EventStream, SyncEvent};
