//! Shared application state.

use std::sync::Arc;

use kerbside_core::{BoundaryMatcher, Snapshot, SnapshotCell};
use kerbside_feed::BaySource;

use crate::config::Config;
use crate::refresh::RefreshCoordinator;

/// State shared by every handler and background loop.
pub struct AppState {
    config: Config,
    snapshots: Arc<SnapshotCell>,
    refresh: Arc<RefreshCoordinator>,
}

impl AppState {
    /// Start from the empty version-0 snapshot; the refresh loop fills it.
    pub fn new(config: Config, source: Arc<dyn BaySource>, matcher: BoundaryMatcher) -> Self {
        let snapshots = Arc::new(SnapshotCell::default());
        let refresh = Arc::new(RefreshCoordinator::new(
            source,
            matcher,
            Arc::clone(&snapshots),
            config.grid(),
            config.fetch_timeout(),
        ));
        Self {
            config,
            snapshots,
            refresh,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current snapshot; hold the `Arc` for the whole request.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshots.load()
    }

    pub fn refresh(&self) -> &Arc<RefreshCoordinator> {
        &self.refresh
    }
}
