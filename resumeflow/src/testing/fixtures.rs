//! Sample payloads for pipeline tests.

use crate::models::{
    AlignmentScores, ContentPreservation, CvComment, EvaluationRequest, EvaluationResult,
    GeneratedResume, ImprovementAnalysis, MissingInfoItem, ResumeArtifact, Submission,
    SupplementalAnswer,
};
use serde_json::json;

/// Bytes standing in for a rendered PDF.
pub const SAMPLE_PDF: &[u8] = b"%PDF-1.7\n%sample\n";

/// Analysis of a frontend developer's resume against a platform role.
///
/// Two sections are flagged as missing: "Frontend Development" and
/// "Cloud & DevOps".
#[must_use]
pub fn sample_evaluation() -> EvaluationResult {
    EvaluationResult {
        resume_data: json!({
            "name": "Alex Doe",
            "experience": [
                { "title": "Frontend Engineer", "company": "Acme", "years": 3 }
            ],
            "skills": ["React", "TypeScript"]
        }),
        job_data: json!({
            "title": "Platform Engineer",
            "company": "Initech"
        }),
        job_data_v2: json!({
            "Frontend": ["React", "TypeScript", "Vue"],
            "Cloud": ["AWS", "GCP", "Terraform"]
        }),
        alignment_scores: AlignmentScores::new()
            .with_group("Frontend", &["React", "TypeScript"], &["Vue"])
            .with_group("Cloud", &[], &["AWS", "GCP", "Terraform"]),
        cv_comment: CvComment {
            advantages: vec!["Strong React background".to_string()],
            disadvantages: vec!["No cloud experience listed".to_string()],
            missing_information: vec![
                MissingInfoItem {
                    field: "Frontend Development".to_string(),
                    suggestion: "Describe a frontend project with measurable impact".to_string(),
                },
                MissingInfoItem {
                    field: "Cloud & DevOps".to_string(),
                    suggestion: "List any cloud platforms you have deployed to".to_string(),
                },
            ],
        },
    }
}

/// A submission answering only the "Frontend Development" prompt.
#[must_use]
pub fn sample_submission() -> Submission {
    let answers = vec![SupplementalAnswer::new(
        "Frontend Development",
        "Describe a frontend project with measurable impact",
        "Built a React dashboard used by 200 analysts",
    )];
    Submission::new(sample_evaluation(), answers)
}

/// An evaluation request for [`SAMPLE_PDF`].
#[must_use]
pub fn sample_evaluation_request() -> EvaluationRequest {
    EvaluationRequest {
        job_description: "Platform Engineer at Initech. AWS, Terraform, React.".to_string(),
        resume: ResumeArtifact::pdf("resume.pdf", SAMPLE_PDF.to_vec()),
    }
}

/// A `Generate` result carrying a PDF.
#[must_use]
pub fn sample_generated() -> GeneratedResume {
    GeneratedResume {
        enhanced_resume_data: json!({
            "name": "Alex Doe",
            "experience": [
                {
                    "title": "Frontend Engineer",
                    "company": "Acme",
                    "years": 3,
                    "highlights": ["Built a React dashboard used by 200 analysts"]
                }
            ],
            "skills": ["React", "TypeScript"]
        }),
        artifact: Some(ResumeArtifact::pdf("enhanced-resume.pdf", SAMPLE_PDF.to_vec())),
        download_url: Some("/resume-flow/download/enhanced-resume.pdf".to_string()),
        overleaf_link: None,
    }
}

/// Alignment of the enhanced resume: 3 of 6 requirements.
#[must_use]
pub fn sample_alignment() -> AlignmentScores {
    AlignmentScores::new()
        .with_group("Frontend", &["React", "TypeScript", "Vue"], &[])
        .with_group("Cloud", &[], &["AWS", "GCP", "Terraform"])
}

/// A preservation ratio of 0.82.
#[must_use]
pub fn sample_preservation() -> ContentPreservation {
    ContentPreservation {
        content_preservation_score: 0.82,
    }
}

/// A short improvement summary.
#[must_use]
pub fn sample_improvements() -> ImprovementAnalysis {
    ImprovementAnalysis {
        original_summary: "Frontend engineer with React experience.".to_string(),
        enhanced_summary: "Frontend engineer who shipped an analytics dashboard to 200 users."
            .to_string(),
        improvements: vec![
            "Quantified the impact of the dashboard project".to_string(),
            "Grouped skills by job requirement".to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StagePayload;

    #[test]
    fn test_fixtures_are_valid_payloads() {
        assert!(sample_evaluation().validate().is_ok());
        assert!(sample_generated().validate().is_ok());
        assert!(sample_preservation().validate().is_ok());
    }

    #[test]
    fn test_submission_leaves_cloud_prompt_unanswered() {
        let missing = sample_submission().missing_information();
        assert_eq!(missing.len(), 2);
        assert_eq!(missing[0].data, "Built a React dashboard used by 200 analysts");
        assert_eq!(missing[1].field, "Cloud & DevOps");
        assert!(missing[1].data.is_empty());
        assert!(!missing[1].suggestion.is_empty());
    }
}
