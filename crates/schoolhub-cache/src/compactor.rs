//! Background compaction for [`IndexedEntityCache`].
//!
//! One task per cache. It wakes on a fixed interval and whenever a delete
//! raises the cache's compaction signal, and stops when its handle is shut
//! down.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use crate::cache::IndexedEntityCache;
use crate::entity::CachedEntity;

/// Default period between timer-driven compaction passes.
pub const DEFAULT_COMPACTION_INTERVAL: Duration = Duration::from_secs(300);

/// Handle to a running compactor task.
pub struct CompactorHandle {
    namespace: &'static str,
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl CompactorHandle {
    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stops the task and waits for it to exit.
    ///
    /// A compaction already in progress runs to completion first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            warn!(namespace = self.namespace, error = %e, "Compactor task ended abnormally");
        }
    }
}

/// Spawns compactor tasks.
pub struct Compactor;

impl Compactor {
    /// Starts the compaction loop for `cache`.
    ///
    /// On a timer tick the cache is compacted only if it holds tombstones;
    /// on a signal it is compacted unconditionally.
    pub fn spawn<E: CachedEntity>(
        cache: Arc<IndexedEntityCache<E>>,
        period: Duration,
    ) -> CompactorHandle {
        let namespace = cache.namespace();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let wake = cache.compaction_signal();
        let period = if period.is_zero() {
            DEFAULT_COMPACTION_INTERVAL
        } else {
            period
        };

        let join = tokio::spawn(async move {
            info!(
                namespace,
                interval_secs = period.as_secs(),
                "Compactor started"
            );

            // The first tick of `interval` fires immediately; skip it.
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if cache.stats().await.deleted == 0 {
                            debug!(namespace, "No tombstones, skipping compaction");
                            continue;
                        }
                        let outcome = cache.compact().await;
                        info!(
                            namespace,
                            reclaimed = outcome.reclaimed,
                            live = outcome.live,
                            trigger = "timer",
                            "Compaction finished"
                        );
                    }
                    _ = wake.notified() => {
                        let outcome = cache.compact().await;
                        info!(
                            namespace,
                            reclaimed = outcome.reclaimed,
                            live = outcome.live,
                            trigger = "signal",
                            "Compaction finished"
                        );
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            info!(namespace, "Compactor shutting down");
                            break;
                        }
                    }
                }
            }
        });

        CompactorHandle {
            namespace,
            shutdown: shutdown_tx,
            join,
        }
    }
}
