use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Lifecycle status of the cleaner. Reported by the control surface and
/// consulted at every cooperative checkpoint of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CleanerStatus {
    Running,
    Stopping,
    Stopped,
    Disabled,
}

impl fmt::Display for CleanerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CleanerStatus::Running => "RUNNING",
            CleanerStatus::Stopping => "STOPPING",
            CleanerStatus::Stopped => "STOPPED",
            CleanerStatus::Disabled => "DISABLED",
        };
        write!(f, "{}", name)
    }
}

const RUNNING: u8 = 0;
const STOPPING: u8 = 1;
const STOPPED: u8 = 2;
const DISABLED: u8 = 3;

fn decode(raw: u8) -> CleanerStatus {
    match raw {
        RUNNING => CleanerStatus::Running,
        STOPPING => CleanerStatus::Stopping,
        DISABLED => CleanerStatus::Disabled,
        _ => CleanerStatus::Stopped,
    }
}

/// Shared lifecycle handle. Clones observe and mutate the same status, so
/// the sweep loop, the lease refresh task and the control surface all agree
/// on the current state without any locking.
#[derive(Debug, Clone)]
pub struct CleanerState {
    status: Arc<AtomicU8>,
}

impl Default for CleanerState {
    fn default() -> Self {
        Self::new()
    }
}

impl CleanerState {
    pub fn new() -> Self {
        CleanerState {
            status: Arc::new(AtomicU8::new(STOPPED)),
        }
    }

    pub fn status(&self) -> CleanerStatus {
        decode(self.status.load(Ordering::SeqCst))
    }

    /// Request a cooperative stop. Only a RUNNING sweep can be stopped; in
    /// every other state this is a no-op. Returns the previous status.
    pub fn stop(&self) -> CleanerStatus {
        match self
            .status
            .compare_exchange(RUNNING, STOPPING, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(prev) => decode(prev),
            Err(prev) => decode(prev),
        }
    }

    /// Force DISABLED from any state. Wins over an in-flight sweep: the
    /// sweep observes it at the next checkpoint and its teardown leaves the
    /// status untouched. Returns the previous status.
    pub fn disable(&self) -> CleanerStatus {
        decode(self.status.swap(DISABLED, Ordering::SeqCst))
    }

    /// Leave DISABLED (or any other state) for STOPPED, making the cleaner
    /// eligible to run again. Returns the previous status.
    pub fn enable(&self) -> CleanerStatus {
        decode(self.status.swap(STOPPED, Ordering::SeqCst))
    }

    /// STOPPED -> RUNNING transition taken by a sweep that passed its
    /// gates. Fails if the status changed in between (e.g. a concurrent
    /// disable).
    pub(crate) fn begin_running(&self) -> bool {
        self.status
            .compare_exchange(STOPPED, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Sweep teardown transition: RUNNING or STOPPING becomes STOPPED.
    /// DISABLED is sticky and survives teardown.
    pub(crate) fn finish(&self) {
        let _ = self
            .status
            .compare_exchange(RUNNING, STOPPED, Ordering::SeqCst, Ordering::SeqCst);
        let _ = self
            .status
            .compare_exchange(STOPPING, STOPPED, Ordering::SeqCst, Ordering::SeqCst);
    }
}

/// Why a sweep ended (or never started).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SweepOutcome {
    /// The archive was drained: a page came back empty.
    Completed,
    /// The oldest remaining candidate is still within the retention window.
    TooYoung,
    /// An external stop request (or the run-time budget) was honored at a
    /// checkpoint.
    StopRequested,
    /// The lease refresh task reported the lease gone mid-sweep.
    LeaseLost,
    /// Another instance holds the lease; nothing was touched.
    LeaseUnavailable,
    /// A sweep was already in flight.
    AlreadyRunning,
    /// The cleaner is administratively disabled.
    Disabled,
    /// Retention is configured non-positive; purging is off.
    RetentionDisabled,
    /// The sweep aborted on an error; see the logs.
    Failed,
}

/// Result of one sweep, as reported by the Execute control operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub outcome: SweepOutcome,
    pub nodes_deleted: usize,
    pub candidates_skipped: usize,
    pub pages_fetched: usize,
}

impl SweepSummary {
    /// A sweep that ended before touching storage.
    pub fn no_op(outcome: SweepOutcome) -> Self {
        SweepSummary {
            outcome,
            nodes_deleted: 0,
            candidates_skipped: 0,
            pages_fetched: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_only_affects_running() {
        let state = CleanerState::new();
        assert_eq!(state.stop(), CleanerStatus::Stopped);
        assert_eq!(state.status(), CleanerStatus::Stopped);

        assert!(state.begin_running());
        assert_eq!(state.stop(), CleanerStatus::Running);
        assert_eq!(state.status(), CleanerStatus::Stopping);
        // Stopping is not RUNNING anymore, a second stop is a no-op.
        assert_eq!(state.stop(), CleanerStatus::Stopping);
    }

    #[test]
    fn test_disable_is_sticky_through_finish() {
        let state = CleanerState::new();
        assert!(state.begin_running());
        assert_eq!(state.disable(), CleanerStatus::Running);
        state.finish();
        assert_eq!(state.status(), CleanerStatus::Disabled);
        assert_eq!(state.enable(), CleanerStatus::Disabled);
        assert_eq!(state.status(), CleanerStatus::Stopped);
    }

    #[test]
    fn test_begin_running_requires_stopped() {
        let state = CleanerState::new();
        state.disable();
        assert!(!state.begin_running());
        state.enable();
        assert!(state.begin_running());
        assert!(!state.begin_running());
    }

    #[test]
    fn test_finish_resets_running_and_stopping() {
        let state = CleanerState::new();
        assert!(state.begin_running());
        state.finish();
        assert_eq!(state.status(), CleanerStatus::Stopped);

        assert!(state.begin_running());
        state.stop();
        state.finish();
        assert_eq!(state.status(), CleanerStatus::Stopped);
    }
}
