#![allow(missing_docs)]
//! Periodic synchronization driver.
//!
//! Runs a [`Synchronizer`] once immediately and then on a fixed interval in a
//! background task. The returned [`SyncHandle`] stops the task or requests an
//! extra cycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::sync::Synchronizer;

/// Fixed-interval driver for a [`Synchronizer`].
pub struct SyncDriver {
    synchronizer: Synchronizer,
    interval: Duration,
}

impl SyncDriver {
    pub fn new(synchronizer: Synchronizer, interval: Duration) -> Self {
        Self {
            synchronizer,
            interval,
        }
    }

    /// Start the background loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> SyncHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let (cycles_tx, cycles_rx) = watch::channel(0u64);
        let trigger = Arc::new(Notify::new());

        let loop_trigger = trigger.clone();
        let Self {
            synchronizer,
            interval,
        } = self;

        let task = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {}
                    _ = loop_trigger.notified() => {}
                }

                match synchronizer.run().await {
                    Ok(report) => {
                        if report.is_clean() {
                            info!(
                                added = report.added,
                                refreshed = report.refreshed,
                                hits = report.hits,
                                evicted = report.evicted,
                                "Synchronization finished"
                            );
                        } else {
                            warn!(
                                failed = ?report.failed,
                                rejected = ?report.rejected,
                                eviction_failures = ?report.eviction_failures,
                                "Synchronization finished with errors"
                            );
                        }
                    }
                    Err(e) if e.is_retryable() => warn!("Synchronization skipped: {}", e),
                    Err(e) => error!("Synchronization failed: {}", e),
                }

                cycles_tx.send_modify(|cycles| *cycles += 1);
            }

            info!("Synchronization loop stopped");
        });

        info!(
            "Synchronization loop started - running every {}s",
            interval.as_secs()
        );

        SyncHandle {
            shutdown: shutdown_tx,
            trigger,
            cycles: cycles_rx,
            task,
        }
    }
}

/// Control handle of a running [`SyncDriver`].
pub struct SyncHandle {
    shutdown: watch::Sender<bool>,
    trigger: Arc<Notify>,
    cycles: watch::Receiver<u64>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Request a cycle now instead of waiting for the next tick.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Number of finished cycles, successful or not.
    pub fn cycles(&self) -> u64 {
        *self.cycles.borrow()
    }

    /// Wait until at least `count` cycles have finished.
    pub async fn wait_for_cycles(&self, count: u64) {
        let mut cycles = self.cycles.clone();
        // Err only if the loop is gone, in which case no more cycles will come.
        let _ = cycles.wait_for(|done| *done >= count).await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the loop and wait for it to exit. A running cycle is not interrupted.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!("Synchronization task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;
    use crate::error::GalleryError;
    use crate::source::MockPostSource;
    use crate::storage::memory::MemoryFileStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn synchronizer(source: MockPostSource) -> Synchronizer {
        let cache = Arc::new(CacheStore::new(Arc::new(MemoryFileStore::default())));
        Synchronizer::new(Arc::new(source), cache)
    }

    fn counting_source(calls: Arc<AtomicUsize>) -> MockPostSource {
        let mut source = MockPostSource::new();
        source.expect_fetch_qualifying_posts().returning(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        });
        source
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_immediately_then_on_interval() {
        let calls = Arc::new(AtomicUsize::new(0));
        let start = time::Instant::now();

        let handle =
            SyncDriver::new(synchronizer(counting_source(calls.clone())), Duration::from_secs(60))
                .spawn();

        handle.wait_for_cycles(1).await;
        assert!(start.elapsed() < Duration::from_secs(60));

        handle.wait_for_cycles(3).await;
        assert!(start.elapsed() >= Duration::from_secs(120));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_runs_extra_cycle() {
        let calls = Arc::new(AtomicUsize::new(0));
        let start = time::Instant::now();

        let handle = SyncDriver::new(
            synchronizer(counting_source(calls.clone())),
            Duration::from_secs(3600),
        )
        .spawn();

        handle.wait_for_cycles(1).await;
        handle.trigger();
        handle.wait_for_cycles(2).await;

        assert!(start.elapsed() < Duration::from_secs(3600));
        assert_eq!(handle.cycles(), 2);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_errors_do_not_stop_the_loop() {
        let mut source = MockPostSource::new();
        source
            .expect_fetch_qualifying_posts()
            .returning(|| Err(GalleryError::source_unavailable("network down")));

        let handle = SyncDriver::new(synchronizer(source), Duration::from_secs(10)).spawn();
        handle.wait_for_cycles(3).await;

        assert!(!handle.is_finished());
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_errors_do_not_stop_the_loop() {
        let mut source = MockPostSource::new();
        source.expect_fetch_qualifying_posts().returning(|| {
            Err(GalleryError::Api {
                status: 403,
                message: "bot lacks channel access".to_string(),
            })
        });

        let handle = SyncDriver::new(synchronizer(source), Duration::from_secs(10)).spawn();
        handle.wait_for_cycles(2).await;

        assert!(!handle.is_finished());
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_the_loop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handle =
            SyncDriver::new(synchronizer(counting_source(calls.clone())), Duration::from_secs(5))
                .spawn();

        handle.wait_for_cycles(1).await;
        handle.stop().await;

        let seen = calls.load(Ordering::SeqCst);
        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), seen);
    }
}
