//! Stage outcome type.

use super::StageStatus;
use serde::{Deserialize, Serialize};

/// The settled outcome of one stage.
///
/// Failures are values: a failed stage never aborts its siblings, so the
/// controller collects outcomes instead of propagating errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome<T> {
    /// The stage produced a result.
    Completed {
        /// The stage result.
        result: T,
    },
    /// The stage failed.
    Failed {
        /// Human readable failure reason.
        reason: String,
    },
}

impl<T> StageOutcome<T> {
    /// Creates a completed outcome.
    #[must_use]
    pub fn completed(result: T) -> Self {
        Self::Completed { result }
    }

    /// Creates a failed outcome.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Returns true if the stage completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Returns true if the stage failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Returns the result, if completed.
    #[must_use]
    pub fn result(&self) -> Option<&T> {
        match self {
            Self::Completed { result } => Some(result),
            Self::Failed { .. } => None,
        }
    }

    /// Consumes the outcome, returning the result if completed.
    #[must_use]
    pub fn into_result(self) -> Option<T> {
        match self {
            Self::Completed { result } => Some(result),
            Self::Failed { .. } => None,
        }
    }

    /// Returns the failure reason, if failed.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Completed { .. } => None,
            Self::Failed { reason } => Some(reason),
        }
    }

    /// Returns the terminal stage status matching this outcome.
    #[must_use]
    pub fn status(&self) -> StageStatus {
        match self {
            Self::Completed { .. } => StageStatus::Completed,
            Self::Failed { .. } => StageStatus::Failed,
        }
    }

    /// Maps the completed result.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> StageOutcome<U> {
        match self {
            Self::Completed { result } => StageOutcome::Completed { result: f(result) },
            Self::Failed { reason } => StageOutcome::Failed { reason },
        }
    }
}
