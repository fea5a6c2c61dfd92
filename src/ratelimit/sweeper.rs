//! Periodic eviction of idle limiter state.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::backend::RateLimiterBackend;

/// Handle to a background task that sweeps a limiter on a fixed interval.
///
/// The task stops when [`Sweeper::stop`] is called or the handle is dropped.
pub struct Sweeper {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    interval: Duration,
}

impl Sweeper {
    /// Start sweeping `backend` every `interval`.
    ///
    /// The first sweep runs one full interval after spawning. Must be called
    /// from within a tokio runtime.
    pub fn spawn(backend: Arc<dyn RateLimiterBackend>, interval: Duration) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel();

        info!(interval_ms = interval.as_millis() as u64, "Starting limiter sweeper");

        let task = tokio::spawn(async move {
            let Some(first) = time::Instant::now().checked_add(interval) else {
                warn!(
                    interval_secs = interval.as_secs(),
                    "Sweep interval out of range, sweeping disabled"
                );
                let _ = stop_rx.await;
                return;
            };
            let mut ticker = time::interval_at(first, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = backend.sweep();
                        if evicted > 0 {
                            debug!(
                                evicted = evicted,
                                remaining = backend.tracked(),
                                "Swept idle limiter state"
                            );
                        }
                    }
                    _ = &mut stop_rx => break,
                }
            }
        });

        Self {
            stop_tx: Some(stop_tx),
            task: Some(task),
            interval,
        }
    }

    /// Interval between sweeps.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Signal the task to stop and wait for it to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Limiter sweeper terminated abnormally");
            }
        }
        info!("Limiter sweeper stopped");
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}
