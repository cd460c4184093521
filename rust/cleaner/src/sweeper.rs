use crate::lease::{LeaseCoordinator, LeaseLiveness};
use crate::pruner::TreePruner;
use crate::scanner::CandidateScanner;
use crate::types::{CleanerState, CleanerStatus, SweepOutcome, SweepSummary};
use chrono::Utc;
use std::time::Duration;
use trashcan_error::TrashcanError;
use trashcan_storage::{LockError, StorageError};

/// Runs one full sweep of the archive: gate, lease, page/prune loop,
/// teardown. The controller is driven by the component on a schedule and by
/// the Execute control operation; both funnel into [`SweepController::execute`].
#[derive(Debug)]
pub struct SweepController {
    scanner: CandidateScanner,
    pruner: TreePruner,
    lease: LeaseCoordinator,
    state: CleanerState,
    retention_days: i64,
    page_size: usize,
    max_batch_size: usize,
    max_run_time: Duration,
}

impl SweepController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scanner: CandidateScanner,
        pruner: TreePruner,
        lease: LeaseCoordinator,
        state: CleanerState,
        retention_days: i64,
        page_size: usize,
        max_batch_size: usize,
        max_run_time: Duration,
    ) -> Self {
        SweepController {
            scanner,
            pruner,
            lease,
            state,
            retention_days,
            page_size,
            max_batch_size,
            max_run_time,
        }
    }

    pub fn state(&self) -> CleanerState {
        self.state.clone()
    }

    /// One sweep. Never leaves the lifecycle RUNNING and never leaks the
    /// lease, whatever path it exits through.
    pub async fn execute(&self) -> Result<SweepSummary, Box<dyn TrashcanError>> {
        if self.retention_days <= 0 {
            tracing::debug!(
                "Retention is {} days, purging is off",
                self.retention_days
            );
            return Ok(SweepSummary::no_op(SweepOutcome::RetentionDisabled));
        }
        match self.state.status() {
            CleanerStatus::Disabled => {
                return Ok(SweepSummary::no_op(SweepOutcome::Disabled));
            }
            CleanerStatus::Running | CleanerStatus::Stopping => {
                return Ok(SweepSummary::no_op(SweepOutcome::AlreadyRunning));
            }
            CleanerStatus::Stopped => {}
        }
        let lease = match self.lease.try_acquire().await {
            Ok(lease) => lease,
            Err(LockError::Unavailable(name)) => {
                tracing::debug!("Sweep lease {} held elsewhere, yielding this run", name);
                return Ok(SweepSummary::no_op(SweepOutcome::LeaseUnavailable));
            }
            Err(err) => return Err(err.boxed()),
        };
        if !self.state.begin_running() {
            // A disable won the race between the status gate and here.
            lease.release().await;
            return Ok(SweepSummary::no_op(SweepOutcome::Disabled));
        }

        // The run-time budget requests a stop exactly like an external one.
        let stop_timer = tokio::spawn({
            let state = self.state.clone();
            let budget = self.max_run_time;
            async move {
                tokio::time::sleep(budget).await;
                tracing::warn!("Sweep exceeded its {:?} run-time budget, stopping", budget);
                state.stop();
            }
        });

        let liveness = lease.liveness();
        let result = self.run_loop(&liveness).await;

        // Teardown runs on every exit path, error paths included.
        stop_timer.abort();
        lease.release().await;
        self.state.finish();

        match result {
            Ok(summary) => {
                tracing::info!(
                    outcome = ?summary.outcome,
                    nodes_deleted = summary.nodes_deleted,
                    candidates_skipped = summary.candidates_skipped,
                    pages_fetched = summary.pages_fetched,
                    "Sweep finished"
                );
                Ok(summary)
            }
            Err(err) => {
                tracing::error!("Sweep aborted: {}", err);
                Err(err.boxed())
            }
        }
    }

    async fn run_loop(&self, liveness: &LeaseLiveness) -> Result<SweepSummary, StorageError> {
        let cutoff = Utc::now() - chrono::Duration::days(self.retention_days);
        tracing::info!("Sweeping archive entries older than {}", cutoff);
        let mut summary = SweepSummary::no_op(SweepOutcome::Completed);
        let mut skip_offset = 0usize;
        loop {
            if let Some(outcome) = self.checkpoint(liveness) {
                summary.outcome = outcome;
                return Ok(summary);
            }
            let page = self.scanner.fetch_page(skip_offset, self.page_size).await?;
            summary.pages_fetched += 1;
            if page.is_empty() {
                summary.outcome = SweepOutcome::Completed;
                return Ok(summary);
            }
            for candidate in page {
                if let Some(outcome) = self.checkpoint(liveness) {
                    summary.outcome = outcome;
                    return Ok(summary);
                }
                match candidate.archived_at {
                    None => {
                        tracing::warn!(
                            "Candidate {} ({}) has no archive timestamp, skipping it",
                            candidate.node,
                            candidate.name.as_deref().unwrap_or("unnamed"),
                        );
                        skip_offset += 1;
                        summary.candidates_skipped += 1;
                        continue;
                    }
                    Some(archived_at) if archived_at >= cutoff => {
                        // Candidates arrive oldest first, so everything
                        // after this one is younger still.
                        summary.outcome = SweepOutcome::TooYoung;
                        return Ok(summary);
                    }
                    Some(_) => {}
                }
                let mut tree_skipped = false;
                loop {
                    if let Some(outcome) = self.checkpoint(liveness) {
                        summary.outcome = outcome;
                        return Ok(summary);
                    }
                    let round = self
                        .pruner
                        .prune_tree(candidate.node, cutoff, self.max_batch_size)
                        .await?;
                    summary.nodes_deleted += round.deleted;
                    tree_skipped |= round.skipped;
                    if round.deleted == 0 {
                        break;
                    }
                }
                if tree_skipped {
                    skip_offset += 1;
                    summary.candidates_skipped += 1;
                }
            }
        }
    }

    /// Cooperative checkpoint, consulted before each page, each candidate
    /// and each prune round. In-flight transactions are never interrupted.
    fn checkpoint(&self, liveness: &LeaseLiveness) -> Option<SweepOutcome> {
        if !liveness.is_active() {
            tracing::warn!("Sweep lease lost, winding down");
            return Some(SweepOutcome::LeaseLost);
        }
        match self.state.status() {
            CleanerStatus::Stopping => Some(SweepOutcome::StopRequested),
            CleanerStatus::Disabled => Some(SweepOutcome::Disabled),
            CleanerStatus::Running | CleanerStatus::Stopped => None,
        }
    }
}
