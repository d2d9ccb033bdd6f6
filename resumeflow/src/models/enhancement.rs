//! Payloads produced by the enhancement stages.

use super::{require_object, ResumeArtifact, StagePayload, SupplementalAnswer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Input of the `Generate` stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Original resume structure.
    pub resume_data: serde_json::Value,
    /// Supplemental answers to fold into the resume.
    pub missing_information: Vec<SupplementalAnswer>,
    /// Target job structure.
    pub job_data: serde_json::Value,
}

/// Output of the `Generate` stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedResume {
    /// Structured enhanced resume.
    pub enhanced_resume_data: serde_json::Value,
    /// Rendered enhanced resume, when the service produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ResumeArtifact>,
    /// Server-side download location of the artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    /// Editable source bundle as a data URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overleaf_link: Option<String>,
}

impl StagePayload for GeneratedResume {
    fn validate(&self) -> Result<(), String> {
        require_object(&self.enhanced_resume_data, "enhanced_resume_data")?;
        match &self.artifact {
            Some(artifact) if artifact.is_empty() => Err("artifact is empty".to_string()),
            _ => Ok(()),
        }
    }
}

/// Requirement coverage for one skill group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupAlignment {
    /// Requirements the resume meets.
    #[serde(default)]
    pub satisfied_requirements: Vec<String>,
    /// Requirements the resume misses.
    #[serde(default)]
    pub unsatisfied_requirements: Vec<String>,
}

impl GroupAlignment {
    /// Number of satisfied requirements.
    #[must_use]
    pub fn achieved(&self) -> usize {
        self.satisfied_requirements.len()
    }

    /// Number of requirements in the group.
    #[must_use]
    pub fn total(&self) -> usize {
        self.satisfied_requirements.len() + self.unsatisfied_requirements.len()
    }
}

/// Per-group alignment scores keyed by skill group name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlignmentScores(pub BTreeMap<String, GroupAlignment>);

impl AlignmentScores {
    /// Creates an empty score set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a group.
    #[must_use]
    pub fn with_group(
        mut self,
        name: impl Into<String>,
        satisfied: &[&str],
        unsatisfied: &[&str],
    ) -> Self {
        self.0.insert(
            name.into(),
            GroupAlignment {
                satisfied_requirements: satisfied.iter().map(ToString::to_string).collect(),
                unsatisfied_requirements: unsatisfied.iter().map(ToString::to_string).collect(),
            },
        );
        self
    }

    /// Iterates over groups.
    pub fn groups(&self) -> impl Iterator<Item = (&String, &GroupAlignment)> {
        self.0.iter()
    }

    /// Satisfied requirements across all groups.
    #[must_use]
    pub fn achieved_sum(&self) -> usize {
        self.0.values().map(GroupAlignment::achieved).sum()
    }

    /// Requirements across all groups.
    #[must_use]
    pub fn max_sum(&self) -> usize {
        self.0.values().map(GroupAlignment::total).sum()
    }
}

impl StagePayload for AlignmentScores {}

/// Input of the `AlignmentScore` stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentRequest {
    /// The generated resume to score.
    pub enhanced: GeneratedResume,
    /// Target job structure.
    pub job_data: serde_json::Value,
    /// Target job requirements grouped by skill.
    pub job_data_v2: serde_json::Value,
}

/// Input of the `ContentPreservation` and `ImprovementDiff` stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRequest {
    /// Original resume structure.
    pub original_resume_data: serde_json::Value,
    /// Enhanced resume structure.
    pub enhanced_resume_data: serde_json::Value,
}

/// Output of the `ContentPreservation` stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContentPreservation {
    /// Similarity of original and enhanced content in `[0, 1]`.
    pub content_preservation_score: f64,
}

impl StagePayload for ContentPreservation {
    fn validate(&self) -> Result<(), String> {
        let score = self.content_preservation_score;
        if score.is_finite() && (0.0..=1.0).contains(&score) {
            Ok(())
        } else {
            Err(format!("content preservation score {score} outside [0, 1]"))
        }
    }
}

/// Output of the `ImprovementDiff` stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImprovementAnalysis {
    /// Summary of the original resume.
    pub original_summary: String,
    /// Summary of the enhanced resume.
    pub enhanced_summary: String,
    /// Individual improvement statements.
    #[serde(default)]
    pub improvements: Vec<String>,
}

impl StagePayload for ImprovementAnalysis {}
