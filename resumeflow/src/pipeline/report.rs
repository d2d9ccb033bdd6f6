//! Display-ready view of a run.

use super::controller::RunReport;
use super::scoring::{alignment_display, preservation_display, DisplayScore};
use crate::core::{StageName, StageOutcome, StageStatus};
use crate::models::{ImprovementAnalysis, ResumeArtifact};
use serde::Serialize;

/// One stage as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageView {
    /// The stage.
    pub stage: StageName,
    /// Its terminal status.
    pub status: StageStatus,
    /// Why it failed, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StageView {
    fn of<T>(stage: StageName, outcome: &StageOutcome<T>) -> Self {
        Self {
            stage,
            status: outcome.status(),
            reason: outcome.reason().map(str::to_string),
        }
    }

    /// True when the stage produced a real result.
    #[must_use]
    pub fn available(&self) -> bool {
        self.status.is_success()
    }
}

/// The summary shown after a run: real results where stages completed,
/// placeholders flagged unavailable where they did not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnhancementReport {
    /// Per-stage status and failure reason.
    pub stages: Vec<StageView>,
    /// The enhanced PDF, if `Generate` completed with one.
    #[serde(skip)]
    pub artifact: Option<ResumeArtifact>,
    /// Overleaf link, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overleaf_link: Option<String>,
    /// Alignment percentage.
    pub alignment: DisplayScore,
    /// Content preservation percentage.
    pub preservation: DisplayScore,
    /// Improvement summary, if `ImprovementDiff` completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub improvements: Option<ImprovementAnalysis>,
    /// Run progress.
    pub progress: u8,
}

impl EnhancementReport {
    /// Builds the view of a run, showing `fallback` for scores that are not
    /// available.
    #[must_use]
    pub fn from_run(report: &RunReport, fallback: u8) -> Self {
        let generated = report.generate.result();
        Self {
            stages: vec![
                StageView::of(StageName::Generate, &report.generate),
                StageView::of(StageName::AlignmentScore, &report.alignment),
                StageView::of(StageName::ContentPreservation, &report.preservation),
                StageView::of(StageName::ImprovementDiff, &report.improvements),
            ],
            artifact: generated.and_then(|g| g.artifact.clone()),
            overleaf_link: generated.and_then(|g| g.overleaf_link.clone()),
            alignment: alignment_display(&report.alignment, fallback),
            preservation: preservation_display(&report.preservation, fallback),
            improvements: report.improvements.result().cloned(),
            progress: report.progress,
        }
    }

    /// The view of one stage.
    #[must_use]
    pub fn stage(&self, stage: StageName) -> Option<&StageView> {
        self.stages.iter().find(|view| view.stage == stage)
    }

    /// Stages that did not produce a result.
    #[must_use]
    pub fn unavailable(&self) -> Vec<StageName> {
        self.stages
            .iter()
            .filter(|view| !view.available())
            .map(|view| view.stage)
            .collect()
    }
}
