//! Start classification.
//!
//! A start carries two signals: the caller's navigation intent and the
//! `processed` marker left in the checkpoint store. They are folded once,
//! at start, into a single [`StartMode`].

use crate::checkpoint::RunMarker;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How the caller arrived at the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NavigationIntent {
    /// The caller just submitted a job. The id names the run it asked for
    /// and is kept by the caller across a reload.
    FreshSubmission {
        /// The submitted run.
        run_id: Uuid,
    },
    /// Reload or direct entry: no submission action preceded the start.
    Reload,
}

impl NavigationIntent {
    /// A fresh-submission intent for a new run.
    #[must_use]
    pub fn fresh() -> Self {
        Self::FreshSubmission {
            run_id: Uuid::now_v7(),
        }
    }
}

/// The classified start of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StartMode {
    /// A new run: invalidate prior checkpoints and start from `Generate`.
    FreshSubmission {
        /// The new run.
        run_id: Uuid,
    },
    /// Continue a run that was already picked up before the restart.
    Resumed {
        /// The run being resumed.
        run_id: Uuid,
        /// A fresh-submission intent was present but already processed.
        stale_intent_discarded: bool,
    },
    /// No intent and no marker. Handled like a resumption.
    DirectEntry,
}

impl StartMode {
    /// Returns true for a fresh submission.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::FreshSubmission { .. })
    }

    /// The run id the mode names, if any.
    #[must_use]
    pub fn run_id(&self) -> Option<Uuid> {
        match self {
            Self::FreshSubmission { run_id } | Self::Resumed { run_id, .. } => Some(*run_id),
            Self::DirectEntry => None,
        }
    }
}

/// Classifies a start.
///
/// | intent | marker | mode |
/// |---|---|---|
/// | fresh `r` | none, or for another run | `FreshSubmission { r }` |
/// | fresh `r` | for `r` | `Resumed { r, stale_intent_discarded: true }` |
/// | reload | for `m` | `Resumed { m, stale_intent_discarded: false }` |
/// | reload | none | `DirectEntry` |
#[must_use]
pub fn classify_start(intent: NavigationIntent, marker: Option<&RunMarker>) -> StartMode {
    match (intent, marker) {
        (NavigationIntent::FreshSubmission { run_id }, Some(marker)) if marker.run_id == run_id => {
            StartMode::Resumed {
                run_id,
                stale_intent_discarded: true,
            }
        }
        (NavigationIntent::FreshSubmission { run_id }, _) => StartMode::FreshSubmission { run_id },
        (NavigationIntent::Reload, Some(marker)) => StartMode::Resumed {
            run_id: marker.run_id,
            stale_intent_discarded: false,
        },
        (NavigationIntent::Reload, None) => StartMode::DirectEntry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_without_marker() {
        let intent = NavigationIntent::fresh();
        let mode = classify_start(intent, None);
        assert!(mode.is_fresh());
        assert_eq!(mode.run_id(), match intent {
            NavigationIntent::FreshSubmission { run_id } => Some(run_id),
            NavigationIntent::Reload => None,
        });
    }

    #[test]
    fn test_fresh_with_marker_of_same_run_is_resumed() {
        let run_id = Uuid::now_v7();
        let marker = RunMarker::new(run_id);
        let mode = classify_start(NavigationIntent::FreshSubmission { run_id }, Some(&marker));
        assert_eq!(
            mode,
            StartMode::Resumed {
                run_id,
                stale_intent_discarded: true
            }
        );
    }

    #[test]
    fn test_fresh_with_marker_of_previous_run_is_fresh() {
        let marker = RunMarker::new(Uuid::now_v7());
        let run_id = Uuid::now_v7();
        let mode = classify_start(NavigationIntent::FreshSubmission { run_id }, Some(&marker));
        assert_eq!(mode, StartMode::FreshSubmission { run_id });
    }

    #[test]
    fn test_reload() {
        let marker = RunMarker::new(Uuid::now_v7());
        assert_eq!(
            classify_start(NavigationIntent::Reload, Some(&marker)),
            StartMode::Resumed {
                run_id: marker.run_id,
                stale_intent_discarded: false
            }
        );
        assert_eq!(
            classify_start(NavigationIntent::Reload, None),
            StartMode::DirectEntry
        );
    }

    #[test]
    fn test_start_mode_serializes_tagged() {
        let json = serde_json::to_value(StartMode::DirectEntry).unwrap();
        assert_eq!(json, serde_json::json!({"mode": "direct_entry"}));
    }
}
