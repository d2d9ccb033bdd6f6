//! Per-run stage record.

use super::{ExecutorState, StageName, StageStatus};
use serde::{Deserialize, Serialize};

/// One unit of pipeline work inside a run.
///
/// `result` is present iff the stage is `Completed`, and `reason` iff it is
/// `Failed`; the transition methods keep that invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// The stage name.
    pub name: StageName,
    /// Stages that must complete before this one may start.
    pub depends_on: Vec<StageName>,
    state: ExecutorState,
    result: Option<serde_json::Value>,
    reason: Option<String>,
}

impl Stage {
    /// Creates a stage in the `NotStarted` state.
    #[must_use]
    pub fn new(name: StageName, depends_on: Vec<StageName>) -> Self {
        Self {
            name,
            depends_on,
            state: ExecutorState::NotStarted,
            result: None,
            reason: None,
        }
    }

    /// Returns the executor state.
    #[must_use]
    pub fn state(&self) -> ExecutorState {
        self.state
    }

    /// Returns the coarse stage status.
    #[must_use]
    pub fn status(&self) -> StageStatus {
        self.state.stage_status()
    }

    /// Returns the result payload, if completed.
    #[must_use]
    pub fn result(&self) -> Option<&serde_json::Value> {
        self.result.as_ref()
    }

    /// Returns the failure reason, if failed.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Moves a non-terminal stage to an in-flight state.
    pub fn set_in_flight(&mut self, state: ExecutorState) {
        debug_assert!(state.is_in_flight());
        if !self.state.is_terminal() {
            self.state = state;
        }
    }

    /// Marks the stage completed with its result.
    pub fn complete(&mut self, result: serde_json::Value) {
        self.state = ExecutorState::Completed;
        self.result = Some(result);
        self.reason = None;
    }

    /// Marks the stage failed with a reason.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.state = ExecutorState::Failed;
        self.result = None;
        self.reason = Some(reason.into());
    }

    /// Returns the stage to `NotStarted`.
    pub fn reset(&mut self) {
        self.state = ExecutorState::NotStarted;
        self.result = None;
        self.reason = None;
    }
}
