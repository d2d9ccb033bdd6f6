//! Remote computation services consumed by the pipeline.
//!
//! The pipeline treats every remote operation as an opaque asynchronous
//! request/response call. [`EnhancementService`] is the seam; the HTTP
//! implementation talks to the `/resume-flow` API and tests use scripted
//! or mocked services.

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::{endpoints, HttpEnhancementService};

use crate::models::{
    AlignmentRequest, AlignmentScores, ComparisonRequest, ContentPreservation, EvaluationRequest,
    EvaluationResult, GenerateRequest, GeneratedResume, ImprovementAnalysis,
};
use async_trait::async_trait;
use thiserror::Error;

/// Failure of a remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The request never produced a response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("HTTP {status}: {detail}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Error detail reported by the service.
        detail: String,
    },

    /// The response could not be decoded or failed validation.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The request could not be built from the available inputs.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl RemoteError {
    /// Creates a status error.
    #[must_use]
    pub fn status(status: u16, detail: impl Into<String>) -> Self {
        Self::Status {
            status,
            detail: detail.into(),
        }
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

/// The remote operations behind the enhancement and analysis pipelines.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EnhancementService: Send + Sync {
    /// Folds the supplemental answers into the resume and renders it for the job.
    async fn generate(&self, request: &GenerateRequest) -> Result<GeneratedResume, RemoteError>;

    /// Scores the generated resume against the job's grouped requirements.
    async fn alignment_score(
        &self,
        request: &AlignmentRequest,
    ) -> Result<AlignmentScores, RemoteError>;

    /// Measures how much original content the enhanced resume keeps.
    async fn content_preservation(
        &self,
        request: &ComparisonRequest,
    ) -> Result<ContentPreservation, RemoteError>;

    /// Summarises what changed between the original and enhanced resume.
    async fn improvement_diff(
        &self,
        request: &ComparisonRequest,
    ) -> Result<ImprovementAnalysis, RemoteError>;

    /// Evaluates a resume against a job description.
    async fn evaluate(&self, request: &EvaluationRequest) -> Result<EvaluationResult, RemoteError>;
}
