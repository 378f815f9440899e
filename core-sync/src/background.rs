//! # Background Sync
//!
//! Runs syncs under a wall-clock budget for platform background-fetch
//! callbacks, and periodically from a scheduler task.
//!
//! ## Overview
//!
//! A background fetch gets about 30 seconds before the platform kills it.
//! [`run_background_sync`] spawns a normal lenient `sync()` and stops
//! *waiting* for it once the budget elapses. The spawned sync is not aborted;
//! it keeps mutating the cache until it finishes on its own.
//!
//! [`BackgroundSyncScheduler`] repeats that on a fixed interval until its
//! handle is stopped.

use crate::manager::{SyncManager, SyncOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Answer reported back to the platform's background-fetch API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundFetchResult {
    NewData,
    NoData,
    Failed,
}

/// Sync once, waiting at most `budget`.
pub async fn run_background_sync(
    manager: Arc<SyncManager>,
    budget: Duration,
) -> BackgroundFetchResult {
    let account = manager.account().clone();
    let task = tokio::spawn(async move { manager.sync().await });

    match tokio::time::timeout(budget, task).await {
        Ok(Ok(Ok(outcome))) => {
            let result = classify(&outcome);
            debug!(account = %account, ?result, "Background sync finished");
            result
        }
        Ok(Ok(Err(err))) => {
            error!(account = %account, error = %err, "Background sync failed");
            BackgroundFetchResult::Failed
        }
        Ok(Err(join_err)) => {
            error!(account = %account, error = %join_err, "Background sync task panicked");
            BackgroundFetchResult::Failed
        }
        Err(_) => {
            warn!(
                account = %account,
                budget_ms = budget.as_millis() as u64,
                "Background sync exceeded its budget; leaving it running"
            );
            BackgroundFetchResult::NoData
        }
    }
}

fn classify(outcome: &SyncOutcome) -> BackgroundFetchResult {
    if outcome.received_new_data() {
        BackgroundFetchResult::NewData
    } else {
        BackgroundFetchResult::NoData
    }
}

/// Periodic background sync for one manager.
pub struct BackgroundSyncScheduler;

impl BackgroundSyncScheduler {
    /// Start syncing every `interval`, each run limited to `budget`.
    ///
    /// The first run happens after one full interval.
    pub fn start(
        manager: Arc<SyncManager>,
        interval: Duration,
        budget: Duration,
    ) -> BackgroundSyncHandle {
        let cancel = CancellationToken::new();
        let child = cancel.child_token();

        let join = tokio::spawn(async move {
            let account = manager.account().clone();
            info!(
                account = %account,
                interval_secs = interval.as_secs(),
                "Background sync scheduler started"
            );

            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        let result = run_background_sync(Arc::clone(&manager), budget).await;
                        debug!(account = %account, ?result, "Scheduled sync ran");
                    }
                }
            }

            info!(account = %account, "Background sync scheduler stopped");
        });

        BackgroundSyncHandle { cancel, join }
    }

    /// Start with the interval and budget from the manager's config.
    pub fn start_with_config(manager: Arc<SyncManager>) -> BackgroundSyncHandle {
        let interval = manager.config().background_interval;
        let budget = manager.config().background_budget;
        Self::start(manager, interval, budget)
    }
}

/// Handle to a running [`BackgroundSyncScheduler`].
pub struct BackgroundSyncHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl BackgroundSyncHandle {
    /// Stop scheduling and wait for the scheduler task to exit.
    ///
    /// A sync started by the scheduler before `stop` keeps running.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(err) = self.join.await {
            error!(error = %err, "Background sync scheduler task failed");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }
}
