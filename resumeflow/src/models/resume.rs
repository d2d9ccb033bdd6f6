//! Resume analysis payloads and the submitted enhancement job.

use super::{base64_bytes, require_object, AlignmentScores, StagePayload};
use serde::{Deserialize, Serialize};

/// An uploaded or generated resume document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeArtifact {
    /// File name presented to the remote service.
    pub filename: String,
    /// MIME type of the document.
    #[serde(default = "default_media_type")]
    pub media_type: String,
    /// Raw document bytes, base64 encoded when serialized.
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
}

fn default_media_type() -> String {
    "application/pdf".to_string()
}

impl ResumeArtifact {
    /// Creates a PDF artifact.
    #[must_use]
    pub fn pdf(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            media_type: default_media_type(),
            bytes,
        }
    }

    /// Returns true if the artifact has no content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A section of the resume the reviewer found lacking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingInfoItem {
    /// Section or skill group needing more information.
    pub field: String,
    /// What the candidate should add.
    pub suggestion: String,
}

/// Reviewer comments on a resume relative to a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CvComment {
    /// Strengths of the resume for the job.
    #[serde(default)]
    pub advantages: Vec<String>,
    /// Weaknesses of the resume for the job.
    #[serde(default)]
    pub disadvantages: Vec<String>,
    /// Missing information the candidate is asked to supply.
    pub missing_information: Vec<MissingInfoItem>,
}

/// Output of the evaluation (analysis) stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Structured original resume.
    pub resume_data: serde_json::Value,
    /// Structured target job.
    pub job_data: serde_json::Value,
    /// Target job requirements grouped by skill.
    pub job_data_v2: serde_json::Value,
    /// Alignment of the original resume with the job.
    #[serde(default)]
    pub alignment_scores: AlignmentScores,
    /// Reviewer comments.
    pub cv_comment: CvComment,
}

impl StagePayload for EvaluationResult {
    fn validate(&self) -> Result<(), String> {
        require_object(&self.resume_data, "resume_data")?;
        require_object(&self.job_data, "job_data")
    }
}

/// Input of the evaluation stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    /// Free-text job description.
    pub job_description: String,
    /// The resume to evaluate.
    pub resume: ResumeArtifact,
}

/// The candidate's answer to one missing-information prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplementalAnswer {
    /// Section the answer fills in.
    pub field: String,
    /// The prompt that was shown.
    #[serde(default)]
    pub suggestion: String,
    /// The candidate's answer.
    #[serde(default)]
    pub data: String,
}

impl SupplementalAnswer {
    /// Creates an answer.
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        suggestion: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            suggestion: suggestion.into(),
            data: data.into(),
        }
    }
}

/// One submitted enhancement job: the analysis and the supplemental answers.
///
/// This is the original submission's payload that the enhancement stages
/// read besides their upstream stage results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// Analysis of the original resume.
    pub analysis: EvaluationResult,
    /// Answers to the missing-information prompts.
    #[serde(default)]
    pub answers: Vec<SupplementalAnswer>,
}

impl Submission {
    /// Creates a submission.
    #[must_use]
    pub fn new(analysis: EvaluationResult, answers: Vec<SupplementalAnswer>) -> Self {
        Self { analysis, answers }
    }

    /// The original resume structure.
    #[must_use]
    pub fn original_resume(&self) -> &serde_json::Value {
        &self.analysis.resume_data
    }

    /// Missing-information items with the candidate's answers filled in.
    ///
    /// Prompts without a matching answer are sent with empty data so the
    /// generator still sees every flagged section.
    #[must_use]
    pub fn missing_information(&self) -> Vec<SupplementalAnswer> {
        let prompts = &self.analysis.cv_comment.missing_information;
        let mut merged: Vec<SupplementalAnswer> = prompts
            .iter()
            .map(|item| {
                self.answers
                    .iter()
                    .find(|answer| answer.field == item.field)
                    .cloned()
                    .unwrap_or_else(|| {
                        SupplementalAnswer::new(&item.field, &item.suggestion, String::new())
                    })
            })
            .collect();
        merged.extend(
            self.answers
                .iter()
                .filter(|answer| !prompts.iter().any(|item| item.field == answer.field))
                .cloned(),
        );
        merged
    }
}

impl StagePayload for Submission {
    fn validate(&self) -> Result<(), String> {
        self.analysis.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_submission;

    #[test]
    fn test_artifact_bytes_are_base64_in_json() {
        let artifact = ResumeArtifact::pdf("resume.pdf", b"%PDF-1.4".to_vec());
        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["bytes"], "JVBERi0xLjQ=");
        assert_eq!(json["media_type"], "application/pdf");

        let back: ResumeArtifact = serde_json::from_value(json).unwrap();
        assert_eq!(back, artifact);
    }

    #[test]
    fn test_artifact_rejects_invalid_base64() {
        let json = serde_json::json!({"filename": "x.pdf", "bytes": "!!not base64!!"});
        assert!(serde_json::from_value::<ResumeArtifact>(json).is_err());
    }

    #[test]
    fn test_missing_information_merges_answers_with_prompts() {
        let submission = sample_submission();
        let merged = submission.missing_information();

        let frontend = merged.iter().find(|a| a.field == "Frontend Development").unwrap();
        assert_eq!(frontend.data, "Built a React dashboard used by 200 analysts");

        let cloud = merged.iter().find(|a| a.field == "Cloud & DevOps").unwrap();
        assert!(cloud.data.is_empty());
        assert!(!cloud.suggestion.is_empty());
    }

    #[test]
    fn test_evaluation_validate_requires_object_resume() {
        let mut submission = sample_submission();
        assert!(submission.validate().is_ok());

        submission.analysis.resume_data = serde_json::json!("plain text");
        assert!(submission.validate().is_err());
    }

    #[test]
    fn test_cv_comment_requires_missing_information() {
        let json = serde_json::json!({"advantages": ["clear"], "disadvantages": []});
        assert!(serde_json::from_value::<CvComment>(json).is_err());
    }
}
