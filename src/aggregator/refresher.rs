// src/aggregator/refresher.rs
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info};

use super::engine::Aggregator;

/// Rebuilds the snapshot on a fixed interval and periodically evicts stale
/// rate limiter entries.
pub struct SnapshotRefresher {
    aggregator: Arc<Aggregator>,
    refresh_interval: Duration,
    eviction_interval: Duration,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

impl SnapshotRefresher {
    pub fn new(
        aggregator: Arc<Aggregator>,
        refresh_interval: Duration,
        eviction_interval: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        Self {
            aggregator,
            refresh_interval,
            eviction_interval,
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub async fn start(self: Arc<Self>) {
        let mut refresh = interval(self.refresh_interval);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut eviction = interval(self.eviction_interval);
        eviction.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_rx = self.shutdown_rx.clone();

        info!(
            "Starting snapshot refresher with interval: {:?}",
            self.refresh_interval
        );

        loop {
            tokio::select! {
                _ = refresh.tick() => {
                    self.aggregator.build_snapshot().await;
                }
                _ = eviction.tick() => {
                    let evicted = self.aggregator.rate_limiter().evict_stale();
                    debug!("Rate limiter eviction removed {} entries", evicted);
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Snapshot refresher shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
