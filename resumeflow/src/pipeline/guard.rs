//! Advisory interruption guard.

use super::CallTracker;
use crate::core::StageName;
use std::sync::Arc;
use tracing::info;

/// What the caller should do with a process-ending action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitDecision {
    /// Nothing is in flight.
    Proceed,
    /// Remote calls are outstanding; ask the user first.
    ConfirmationRequired {
        /// The stages with calls outstanding.
        in_flight: Vec<StageName>,
    },
}

impl ExitDecision {
    /// Returns true if the caller must confirm before exiting.
    #[must_use]
    pub fn needs_confirmation(&self) -> bool {
        matches!(self, Self::ConfirmationRequired { .. })
    }
}

/// Gates navigation away or reload behind a confirmation while any stage
/// is in flight. It never aborts outstanding calls.
#[derive(Debug, Clone)]
pub struct InterruptionGuard {
    tracker: Arc<CallTracker>,
}

impl InterruptionGuard {
    /// Creates a guard over a tracker.
    #[must_use]
    pub fn new(tracker: Arc<CallTracker>) -> Self {
        Self { tracker }
    }

    /// Returns true if any stage is in flight.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.tracker.any_in_flight()
    }

    /// Decides whether an exit may proceed.
    #[must_use]
    pub fn request_exit(&self) -> ExitDecision {
        let in_flight = self.tracker.in_flight();
        if in_flight.is_empty() {
            ExitDecision::Proceed
        } else {
            info!(stages = ?in_flight, "Exit requested while stages are in flight");
            ExitDecision::ConfirmationRequired { in_flight }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageOutcome;
    use crate::pipeline::Dispatch;

    #[test]
    fn test_guard_follows_tracker() {
        let tracker = Arc::new(CallTracker::new());
        let guard = InterruptionGuard::new(tracker.clone());
        assert_eq!(guard.request_exit(), ExitDecision::Proceed);

        let Dispatch::Acquired(permit) = tracker.begin(StageName::Generate) else {
            panic!("expected to acquire");
        };
        assert!(guard.is_armed());
        assert_eq!(
            guard.request_exit(),
            ExitDecision::ConfirmationRequired {
                in_flight: vec![StageName::Generate]
            }
        );

        permit.settle(StageOutcome::failed("HTTP 500: x"));
        assert!(!guard.request_exit().needs_confirmation());
    }
}
