//! Sync status reporting for progress indicators.
//!
//! A manager reports its phase as a plain status string through a
//! [`StatusSink`]. [`WatchStatusSink`] keeps the latest
//! [`SyncStatusSnapshot`] in a `tokio::sync::watch` channel so a UI can render
//! "Pushing changes" / "Pulling changes", a spinner while any sync is active,
//! and the time of the last successful sync.

use bridge_traits::Clock;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Phase of an active sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    PushingChanges,
    PullingChanges,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::PushingChanges => "Pushing changes",
            SyncPhase::PullingChanges => "Pulling changes",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver of status transitions.
///
/// Calls happen inline on the sync task and must not block.
pub trait StatusSink: Send + Sync {
    /// `None` means idle.
    fn set_status(&self, status: Option<&str>);

    fn on_sync_started(&self) {}

    fn on_sync_finished(&self, _succeeded: bool) {}
}

/// Latest status as seen by the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatusSnapshot {
    pub status: Option<String>,
    /// Syncs currently running
    pub sync_count: u32,
    pub last_sync: Option<DateTime<Utc>>,
}

impl SyncStatusSnapshot {
    pub fn is_syncing(&self) -> bool {
        self.sync_count > 0
    }
}

/// [`StatusSink`] backed by a watch channel.
pub struct WatchStatusSink {
    sender: watch::Sender<SyncStatusSnapshot>,
    clock: Arc<dyn Clock>,
}

impl WatchStatusSink {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (sender, _) = watch::channel(SyncStatusSnapshot::default());
        Self { sender, clock }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatusSnapshot> {
        self.sender.subscribe()
    }

    pub fn snapshot(&self) -> SyncStatusSnapshot {
        self.sender.borrow().clone()
    }
}

impl StatusSink for WatchStatusSink {
    fn set_status(&self, status: Option<&str>) {
        self.sender
            .send_modify(|snapshot| snapshot.status = status.map(str::to_string));
    }

    fn on_sync_started(&self) {
        self.sender
            .send_modify(|snapshot| snapshot.sync_count = snapshot.sync_count.saturating_add(1));
    }

    fn on_sync_finished(&self, succeeded: bool) {
        let now = self.clock.now();
        self.sender.send_modify(|snapshot| {
            snapshot.sync_count = snapshot.sync_count.saturating_sub(1);
            if succeeded {
                snapshot.last_sync = Some(now);
            }
        });
    }
}

impl fmt::Debug for WatchStatusSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchStatusSink")
            .field("snapshot", &*self.sender.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::{FixedClock, SystemClock};
    use chrono::TimeZone;

    #[test]
    fn test_phase_strings() {
        assert_eq!(SyncPhase::PushingChanges.to_string(), "Pushing changes");
        assert_eq!(SyncPhase::PullingChanges.as_str(), "Pulling changes");
    }

    #[test]
    fn test_watch_sink_tracks_count_and_last_sync() {
        let sink = WatchStatusSink::new(Arc::new(SystemClock));
        let receiver = sink.subscribe();

        sink.on_sync_started();
        sink.set_status(Some(SyncPhase::PushingChanges.as_str()));
        assert!(receiver.borrow().is_syncing());
        assert_eq!(receiver.borrow().status.as_deref(), Some("Pushing changes"));

        sink.set_status(None);
        sink.on_sync_finished(true);

        let snapshot = sink.snapshot();
        assert_eq!(snapshot.sync_count, 0);
        assert!(snapshot.status.is_none());
        assert!(snapshot.last_sync.is_some());
    }

    #[test]
    fn test_failed_sync_keeps_previous_last_sync() {
        let first = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(first));
        let sink = WatchStatusSink::new(clock.clone());

        sink.on_sync_started();
        sink.on_sync_finished(false);
        assert!(sink.snapshot().last_sync.is_none());

        sink.on_sync_started();
        sink.on_sync_finished(true);
        assert_eq!(sink.snapshot().last_sync, Some(first));

        clock.advance(chrono::Duration::hours(4));
        sink.on_sync_started();
        sink.on_sync_finished(false);
        assert_eq!(sink.snapshot().last_sync, Some(first));
    }
}
