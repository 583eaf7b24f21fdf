//! Snapshot refresh coordinator.
//!
//! One cycle fetches raw records, builds a new snapshot on a blocking worker
//! and publishes it with a single pointer swap. A failed cycle leaves the
//! current snapshot in place; the next scheduled tick is the retry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use kerbside_core::{build_snapshot, BoundaryMatcher, BuildSummary, GridConfig, SnapshotCell};
use kerbside_feed::{BaySource, FeedError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshPhase {
    Idle,
    Fetching,
    Building,
    Published,
}

/// Result of an on-demand trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefreshTrigger {
    pub started: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Another cycle was already running.
    Skipped,
    Published { version: u64, points: usize },
    Failed(String),
}

/// Point-in-time view of the coordinator for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshStatus {
    pub phase: RefreshPhase,
    pub in_progress: bool,
    pub snapshot_version: u64,
    pub points: usize,
    pub cycles_run: u64,
    pub cycles_failed: u64,
    pub last_started: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_summary: Option<BuildSummary>,
}

#[derive(Debug, Default)]
struct Progress {
    phase: Option<RefreshPhase>,
    cycles_run: u64,
    cycles_failed: u64,
    last_started: Option<DateTime<Utc>>,
    last_success: Option<DateTime<Utc>>,
    last_error: Option<String>,
    last_summary: Option<BuildSummary>,
}

/// Single-flight guard; clears the running flag when dropped, including
/// when an in-flight cycle is abandoned.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct RefreshCoordinator {
    source: Arc<dyn BaySource>,
    matcher: Arc<BoundaryMatcher>,
    snapshots: Arc<SnapshotCell>,
    grid: GridConfig,
    fetch_timeout: Duration,
    running: Arc<AtomicBool>,
    progress: Mutex<Progress>,
}

impl RefreshCoordinator {
    pub fn new(
        source: Arc<dyn BaySource>,
        matcher: BoundaryMatcher,
        snapshots: Arc<SnapshotCell>,
        grid: GridConfig,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            source,
            matcher: Arc::new(matcher),
            snapshots,
            grid,
            fetch_timeout,
            running: Arc::new(AtomicBool::new(false)),
            progress: Mutex::new(Progress::default()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start a cycle in the background unless one is already running.
    pub fn refresh_now(self: &Arc<Self>) -> RefreshTrigger {
        let Some(guard) = self.try_begin() else {
            tracing::debug!("Refresh requested while a cycle is running; ignoring");
            return RefreshTrigger { started: false };
        };

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            coordinator.run_cycle().await;
        });
        RefreshTrigger { started: true }
    }

    /// Run one cycle to completion, or skip if one is already running.
    pub async fn refresh(&self) -> RefreshOutcome {
        let Some(_guard) = self.try_begin() else {
            tracing::debug!("Refresh cycle already in progress; skipping tick");
            return RefreshOutcome::Skipped;
        };
        self.run_cycle().await
    }

    pub fn status(&self) -> RefreshStatus {
        let snapshot = self.snapshots.load();
        let progress = self.progress();
        RefreshStatus {
            phase: progress.phase.unwrap_or(RefreshPhase::Idle),
            in_progress: self.is_running(),
            snapshot_version: snapshot.version(),
            points: snapshot.len(),
            cycles_run: progress.cycles_run,
            cycles_failed: progress.cycles_failed,
            last_started: progress.last_started,
            last_success: progress.last_success,
            last_error: progress.last_error.clone(),
            last_summary: progress.last_summary.clone(),
        }
    }

    fn try_begin(&self) -> Option<InFlight> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(Arc::clone(&self.running)))
    }

    fn progress(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, phase: RefreshPhase) {
        self.progress().phase = Some(phase);
    }

    async fn run_cycle(&self) -> RefreshOutcome {
        {
            let mut progress = self.progress();
            progress.phase = Some(RefreshPhase::Fetching);
            progress.cycles_run += 1;
            progress.last_started = Some(Utc::now());
        }

        let batch = match tokio::time::timeout(self.fetch_timeout, self.source.fetch()).await {
            Ok(Ok(batch)) if batch.is_empty() => Err(FeedError::Empty),
            Ok(result) => result,
            Err(_) => Err(FeedError::Timeout(self.fetch_timeout)),
        };
        let batch = match batch {
            Ok(batch) => batch,
            Err(err) => return self.fail(format!("fetch from {} failed: {}", self.source.name(), err)),
        };
        tracing::debug!(
            "Fetched {} records ({} undecodable) from {}",
            batch.records.len(),
            batch.rejected,
            self.source.name()
        );

        self.enter(RefreshPhase::Building);
        let version = self.snapshots.version() + 1;
        let matcher = Arc::clone(&self.matcher);
        let grid = self.grid;
        let built = tokio::task::spawn_blocking(move || {
            build_snapshot(&batch, &matcher, &grid, version, Utc::now())
        })
        .await;

        let snapshot = match built {
            Ok(snapshot) => snapshot,
            Err(err) => return self.fail(format!("snapshot build aborted: {err}")),
        };

        let summary = snapshot.summary().clone();
        if summary.indexed == 0 {
            return self.fail(format!(
                "none of {} records were usable ({:?})",
                summary.received, summary.skipped_by_reason
            ));
        }
        if summary.skipped > 0 {
            tracing::warn!(
                "Skipped {} malformed records: {:?}",
                summary.skipped,
                summary.skipped_by_reason
            );
        }

        let points = snapshot.len();
        self.snapshots.publish(snapshot);
        tracing::info!(
            "Published snapshot v{}: {} points ({} duplicates, {} matched to suburbs, {} unmatched)",
            version,
            points,
            summary.duplicates,
            summary.matched,
            summary.unmatched
        );

        {
            let mut progress = self.progress();
            progress.phase = Some(RefreshPhase::Published);
            progress.last_success = Some(Utc::now());
            progress.last_error = None;
            progress.last_summary = Some(summary);
        }
        self.enter(RefreshPhase::Idle);

        RefreshOutcome::Published { version, points }
    }

    fn fail(&self, message: String) -> RefreshOutcome {
        tracing::warn!(
            "Refresh failed, keeping snapshot v{}: {}",
            self.snapshots.version(),
            message
        );
        let mut progress = self.progress();
        progress.phase = Some(RefreshPhase::Idle);
        progress.cycles_failed += 1;
        progress.last_error = Some(message.clone());
        RefreshOutcome::Failed(message)
    }
}
