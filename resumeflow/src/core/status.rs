//! Stage names, stage status and executor state enums.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The fixed set of stages known to the pipelines.
///
/// The enhancement pipeline uses [`StageName::ENHANCEMENT`]; the analysis
/// pipeline is the single `Evaluate` stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Produces the enhanced resume artifact and structure.
    Generate,
    /// Scores the enhanced artifact against the target job.
    AlignmentScore,
    /// Measures how much of the original content survived enhancement.
    ContentPreservation,
    /// Summarises the improvements between original and enhanced resume.
    ImprovementDiff,
    /// Evaluates a resume against a job description (analysis pipeline).
    Evaluate,
}

impl StageName {
    /// Stages of the enhancement pipeline, in graph order.
    pub const ENHANCEMENT: [Self; 4] = [
        Self::Generate,
        Self::AlignmentScore,
        Self::ContentPreservation,
        Self::ImprovementDiff,
    ];

    /// Returns the stable identifier used in storage keys and events.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::AlignmentScore => "alignment_score",
            Self::ContentPreservation => "content_preservation",
            Self::ImprovementDiff => "improvement_diff",
            Self::Evaluate => "evaluate",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generate" => Ok(Self::Generate),
            "alignment_score" => Ok(Self::AlignmentScore),
            "content_preservation" => Ok(Self::ContentPreservation),
            "improvement_diff" => Ok(Self::ImprovementDiff),
            "evaluate" => Ok(Self::Evaluate),
            other => Err(format!("unknown stage name: {other}")),
        }
    }
}

/// The status of a stage within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage has not produced an outcome yet.
    #[default]
    Pending,
    /// Stage has a remote call outstanding.
    Running,
    /// Stage completed and its result is checkpointed.
    Completed,
    /// Stage failed; the reason is checkpointed.
    Failed,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if the status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// The state machine a stage executor walks through for one invocation.
///
/// `NotStarted -> Dispatching -> AwaitingRemote -> {Completed | Failed}`.
/// Cache hits jump straight from `NotStarted` to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorState {
    /// Nothing has happened for this stage in the current run.
    #[default]
    NotStarted,
    /// The call tracker slot has been claimed; the remote call is being issued.
    Dispatching,
    /// The remote call is outstanding.
    AwaitingRemote,
    /// Terminal: result checkpointed.
    Completed,
    /// Terminal: failure checkpointed.
    Failed,
}

impl ExecutorState {
    /// Returns true if the state is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if the executor has a remote call in progress.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Dispatching | Self::AwaitingRemote)
    }

    /// Maps the executor state onto the coarser stage status.
    #[must_use]
    pub fn stage_status(&self) -> StageStatus {
        match self {
            Self::NotStarted => StageStatus::Pending,
            Self::Dispatching | Self::AwaitingRemote => StageStatus::Running,
            Self::Completed => StageStatus::Completed,
            Self::Failed => StageStatus::Failed,
        }
    }
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Dispatching => write!(f, "dispatching"),
            Self::AwaitingRemote => write!(f, "awaiting_remote"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_name_display_round_trips_through_from_str() {
        for stage in StageName::ENHANCEMENT {
            let parsed: StageName = stage.to_string().parse().unwrap();
            assert_eq!(parsed, stage);
        }
        assert!("unknown".parse::<StageName>().is_err());
    }

    #[test]
    fn test_stage_name_serialize() {
        let json = serde_json::to_string(&StageName::ContentPreservation).unwrap();
        assert_eq!(json, r#""content_preservation""#);
    }

    #[test]
    fn test_stage_status_is_terminal() {
        assert!(StageStatus::Completed.is_terminal());
        assert!(StageStatus::Failed.is_terminal());
        assert!(!StageStatus::Pending.is_terminal());
        assert!(!StageStatus::Running.is_terminal());
        assert!(!StageStatus::Failed.is_success());
    }

    #[test]
    fn test_executor_state_maps_to_stage_status() {
        assert_eq!(ExecutorState::NotStarted.stage_status(), StageStatus::Pending);
        assert_eq!(ExecutorState::Dispatching.stage_status(), StageStatus::Running);
        assert_eq!(ExecutorState::AwaitingRemote.stage_status(), StageStatus::Running);
        assert_eq!(ExecutorState::Completed.stage_status(), StageStatus::Completed);
        assert_eq!(ExecutorState::Failed.stage_status(), StageStatus::Failed);
        assert!(ExecutorState::AwaitingRemote.is_in_flight());
        assert!(!ExecutorState::Failed.is_in_flight());
    }
}
