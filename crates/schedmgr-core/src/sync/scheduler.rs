//! Periodic silent pull-then-push.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::storage::SyncConfig;
use crate::sync::engine::SyncEngine;
use crate::sync::types::{ErrorKind, SyncError};

/// When the loop first fires and how often after that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSchedule {
    pub initial_delay: Duration,
    pub interval: Duration,
}

impl Default for SyncSchedule {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            interval: Duration::from_secs(300),
        }
    }
}

impl From<&SyncConfig> for SyncSchedule {
    fn from(config: &SyncConfig) -> Self {
        Self {
            initial_delay: Duration::from_secs(config.initial_delay_secs),
            interval: Duration::from_secs(config.interval_secs.max(1)),
        }
    }
}

/// Handle to the running loop. Dropping it stops the loop; a round
/// already in flight is left to finish.
pub struct AutoSync {
    handle: JoinHandle<()>,
}

impl AutoSync {
    /// Start the loop, or `None` when there is no external calendar or the
    /// local store is not connected.
    pub fn spawn(engine: Arc<SyncEngine>, schedule: SyncSchedule) -> Option<Self> {
        if !engine.is_configured() {
            debug!("auto sync inert: no external calendar");
            return None;
        }
        if !engine.store_connected() {
            debug!("auto sync inert: local store not connected");
            return None;
        }

        info!(
            initial_delay_secs = schedule.initial_delay.as_secs(),
            interval_secs = schedule.interval.as_secs(),
            "auto sync started"
        );
        let handle = tokio::spawn(run_loop(engine, schedule));
        Some(Self { handle })
    }

    /// Cancel the pending delay and the interval.
    pub fn shutdown(self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for AutoSync {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run_loop(engine: Arc<SyncEngine>, schedule: SyncSchedule) {
    time::sleep(schedule.initial_delay).await;

    let mut ticker = time::interval(schedule.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        tokio::spawn(silent_round(Arc::clone(&engine)));
    }
}

/// One round whose outcome is only logged.
async fn silent_round(engine: Arc<SyncEngine>) {
    match engine.sync_once().await {
        Ok(report) => debug!(%report, "auto sync round done"),
        Err(SyncError::InFlight) => debug!("auto sync tick skipped, previous round still running"),
        Err(err) if err.kind() == ErrorKind::Configuration => {
            debug!(error = %err, "auto sync round skipped")
        }
        Err(err) => warn!(error = %err, "auto sync round failed"),
    }
}
