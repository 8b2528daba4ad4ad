//! Background watcher for the browser session.
//!
//! One watcher task is started per [`GenerationTracker::reinitialize`] call
//! and pins the epoch it was started for. When a newer session supersedes
//! it, the watcher exits silently; when the tab or browser process
//! disappears, it invalidates the driver so in-flight orchestrations abort
//! on their next cooperative check and new requests are refused.

use std::sync::Arc;
use std::time::Duration;

use page_driver::PageDriver;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error};

use crate::generation::GenerationTracker;

pub const SESSION_PROBE_INTERVAL: Duration = Duration::from_secs(2);

/// Spawn the liveness watcher for the current session epoch.
pub fn spawn_session_monitor(
    tracker: Arc<GenerationTracker>,
    driver: Arc<dyn PageDriver>,
    probe_interval: Duration,
) -> JoinHandle<()> {
    let watched_epoch = tracker.session_epoch();
    tokio::spawn(async move {
        let mut ticker = interval(probe_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            if tracker.session_epoch() != watched_epoch {
                debug!(
                    target: "session-monitor",
                    watched_epoch,
                    "superseded by a newer session, stopping"
                );
                break;
            }

            // The probe swallows its own failures: an erroring probe and a
            // dead tab get the same treatment.
            if !driver.is_alive().await {
                error!(
                    target: "session-monitor",
                    watched_epoch,
                    "browser session lost; refusing further requests"
                );
                tracker.invalidate_driver();
                break;
            }
        }
    })
}
