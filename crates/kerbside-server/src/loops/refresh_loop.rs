//! Periodic snapshot refresh.
//!
//! Ticks on a fixed interval; the first tick fires immediately so the
//! service has data shortly after startup. Missed ticks are skipped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};

use crate::refresh::{RefreshCoordinator, RefreshOutcome};

pub async fn run_refresh_loop(
    coordinator: Arc<RefreshCoordinator>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::info!("Refresh loop started (every {:?})", period);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Refresh loop shutting down");
                break;
            }
            _ = ticker.tick() => {}
        }

        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Refresh loop shutting down; abandoning in-flight cycle");
                break;
            }
            outcome = coordinator.refresh() => {
                if outcome == RefreshOutcome::Skipped {
                    tracing::debug!("Scheduled refresh skipped; a cycle is already running");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kerbside_core::{BoundaryMatcher, GridConfig, RawBayRecord, SnapshotCell};
    use kerbside_feed::StaticSource;

    #[tokio::test]
    async fn loop_publishes_and_stops_on_shutdown() {
        let snapshots = Arc::new(SnapshotCell::default());
        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::new(StaticSource::new(vec![
                RawBayRecord::new("a", -37.8136, 144.9631, "Unoccupied"),
                RawBayRecord::new("b", -37.8140, 144.9635, "Present"),
            ])),
            BoundaryMatcher::empty(),
            Arc::clone(&snapshots),
            GridConfig::default(),
            Duration::from_secs(1),
        ));

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(run_refresh_loop(
            Arc::clone(&coordinator),
            Duration::from_millis(20),
            shutdown_rx,
        ));

        for _ in 0..200 {
            if snapshots.version() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(snapshots.version() >= 2);

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop did not stop")
            .unwrap();
        assert!(!coordinator.is_running());
    }
}
