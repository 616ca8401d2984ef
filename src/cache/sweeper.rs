//! Periodic background removal of expired cache entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use super::Cache;

/// Default time between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Shortest interval a sweeper will run at; shorter requests are raised to it.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

/// Handle to a background task that sweeps a [`Cache`] on a fixed interval.
///
/// The task stops when [`shutdown`](Self::shutdown) is awaited or the handle is
/// dropped, so no sweep outlives its owner.
#[derive(Debug)]
pub struct Sweeper {
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Spawns the sweep loop on the current tokio runtime.
    ///
    /// The first sweep runs one full `interval` after spawning. An interval
    /// below [`MIN_SWEEP_INTERVAL`] (zero included) is raised to it.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn<V>(cache: Arc<Cache<V>>, interval: Duration) -> Self
    where
        V: Clone + Send + Sync + 'static,
    {
        let interval = interval.max(MIN_SWEEP_INTERVAL);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(sweep_loop(cache, interval, shutdown_rx));
        info!(interval_ms = interval.as_millis() as u64, "cache sweeper started");
        Self {
            shutdown_tx,
            handle: Some(handle),
        }
    }

    /// Returns `true` while the sweep task is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signals the loop to stop and waits for it to exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn sweep_loop<V>(
    cache: Arc<Cache<V>>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    V: Clone + Send + Sync + 'static,
{
    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // A dropped sender also means the owner is gone.
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("cache sweeper shutting down");
                    return;
                }
            }
            _ = ticker.tick() => {
                let removed = cache.clean_expired_entries();
                if removed > 0 {
                    debug!(removed, "cache sweep removed expired entries");
                }
            }
        }
    }
}
