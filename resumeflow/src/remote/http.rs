//! HTTP implementation of the enhancement service.

use super::{EnhancementService, RemoteError};
use crate::config::HttpConfig;
use crate::models::{
    AlignmentRequest, AlignmentScores, ComparisonRequest, ContentPreservation, EvaluationRequest,
    EvaluationResult, GenerateRequest, GeneratedResume, ImprovementAnalysis, ResumeArtifact,
    StagePayload,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument};

/// Paths of the resume API.
pub mod endpoints {
    /// Adds the supplemental answers and renders the enhanced resume.
    pub const ADD_DATA_AND_CREATE_RESUME: &str = "/resume-flow/add-data-and-create-resume";
    /// Scores a resume file against the job.
    pub const CALCULATE_ALIGNMENT_SCORE: &str = "/resume-flow/calculate-alignment-score/";
    /// Embedding similarity between two resume structures.
    pub const CALCULATE_CONTENT_PRESERVATION: &str = "/resume-flow/calculate-content-preservation/";
    /// Improvement summary between two resume structures.
    pub const ANALYZE_RESUME_IMPROVEMENTS: &str = "/resume-flow/analyze-resume-improvements/";
    /// Evaluates a resume file against a job description.
    pub const EVALUATE_CV: &str = "/resume-flow/evaluate-cv/";
}

#[derive(Debug, Deserialize)]
struct CreateResumeResponse {
    new_resume_data: serde_json::Value,
    #[serde(default)]
    pdf_filename: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    overleaf_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlignmentResponse {
    alignment_score: AlignmentScores,
}

/// Talks to the `/resume-flow` API with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpEnhancementService {
    client: reqwest::Client,
    config: HttpConfig,
}

impl HttpEnhancementService {
    /// Creates a service from configuration.
    pub fn new(config: HttpConfig) -> Result<Self, RemoteError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.bearer_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| RemoteError::InvalidRequest(format!("invalid bearer token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| RemoteError::transport(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.config.base_url, path)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, RemoteError>
    where
        B: serde::Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        read_json(response).await
    }

    async fn post_form<T: DeserializeOwned>(&self, path: &str, form: Form) -> Result<T, RemoteError> {
        let response = self
            .client
            .post(self.url(path))
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;
        read_json(response).await
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, RemoteError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::status(status.as_u16(), extract_detail(&body)));
        }
        let bytes = response.bytes().await.map_err(transport_error)?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl EnhancementService for HttpEnhancementService {
    #[instrument(skip_all)]
    async fn generate(&self, request: &GenerateRequest) -> Result<GeneratedResume, RemoteError> {
        let created: CreateResumeResponse = self
            .post_json(endpoints::ADD_DATA_AND_CREATE_RESUME, request)
            .await?;

        // The server removes the rendered file once it has been downloaded,
        // so the bytes must travel with the stage result.
        let artifact = match &created.download_url {
            Some(url) => {
                let bytes = self.download(url).await?;
                let filename = created
                    .pdf_filename
                    .clone()
                    .unwrap_or_else(|| "enhanced-resume.pdf".to_string());
                debug!(filename = %filename, size = bytes.len(), "Downloaded generated resume");
                Some(ResumeArtifact::pdf(filename, bytes))
            }
            None => None,
        };

        let generated = GeneratedResume {
            enhanced_resume_data: created.new_resume_data,
            artifact,
            download_url: created.download_url,
            overleaf_link: created.overleaf_link,
        };
        generated.validate().map_err(RemoteError::InvalidResponse)?;
        Ok(generated)
    }

    #[instrument(skip_all)]
    async fn alignment_score(
        &self,
        request: &AlignmentRequest,
    ) -> Result<AlignmentScores, RemoteError> {
        let artifact = request.enhanced.artifact.as_ref().ok_or_else(|| {
            RemoteError::InvalidRequest("generated resume has no rendered artifact".to_string())
        })?;

        let form = Form::new()
            .part("resume_file", artifact_part(artifact)?)
            .text("job_data", to_json_string(&request.job_data)?)
            .text("job_data_v2", to_json_string(&request.job_data_v2)?);

        let response: AlignmentResponse = self
            .post_form(endpoints::CALCULATE_ALIGNMENT_SCORE, form)
            .await?;
        Ok(response.alignment_score)
    }

    #[instrument(skip_all)]
    async fn content_preservation(
        &self,
        request: &ComparisonRequest,
    ) -> Result<ContentPreservation, RemoteError> {
        let body = serde_json::json!({
            "resume_data_1": request.original_resume_data,
            "resume_data_2": request.enhanced_resume_data,
        });
        let preservation: ContentPreservation = self
            .post_json(endpoints::CALCULATE_CONTENT_PRESERVATION, &body)
            .await?;
        preservation
            .validate()
            .map_err(RemoteError::InvalidResponse)?;
        Ok(preservation)
    }

    #[instrument(skip_all)]
    async fn improvement_diff(
        &self,
        request: &ComparisonRequest,
    ) -> Result<ImprovementAnalysis, RemoteError> {
        self.post_json(endpoints::ANALYZE_RESUME_IMPROVEMENTS, request)
            .await
    }

    #[instrument(skip_all)]
    async fn evaluate(&self, request: &EvaluationRequest) -> Result<EvaluationResult, RemoteError> {
        let form = Form::new()
            .text("job_description", request.job_description.trim().to_string())
            .part("resume_file", artifact_part(&request.resume)?);

        let evaluation: EvaluationResult = self.post_form(endpoints::EVALUATE_CV, form).await?;
        evaluation
            .validate()
            .map_err(RemoteError::InvalidResponse)?;
        Ok(evaluation)
    }
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    RemoteError::transport(err.to_string())
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RemoteError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RemoteError::status(status.as_u16(), extract_detail(&body)));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
}

fn artifact_part(artifact: &ResumeArtifact) -> Result<Part, RemoteError> {
    Part::bytes(artifact.bytes.clone())
        .file_name(artifact.filename.clone())
        .mime_str(&artifact.media_type)
        .map_err(|e| RemoteError::InvalidRequest(format!("invalid media type: {e}")))
}

fn to_json_string(value: &serde_json::Value) -> Result<String, RemoteError> {
    serde_json::to_string(value).map_err(|e| RemoteError::InvalidRequest(e.to_string()))
}

/// Joins a base URL and a path, or returns the path if it is already absolute.
fn join_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base_url.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Pulls FastAPI's `detail` field out of an error body, falling back to the body.
fn extract_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("detail").and_then(|d| d.as_str()).map(str::to_string))
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                "empty response body".to_string()
            } else {
                body.trim().to_string()
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("http://localhost:8001/", endpoints::EVALUATE_CV),
            "http://localhost:8001/resume-flow/evaluate-cv/"
        );
        assert_eq!(
            join_url("http://localhost:8001", "resume-flow/download-pdf/a.pdf"),
            "http://localhost:8001/resume-flow/download-pdf/a.pdf"
        );
        assert_eq!(
            join_url("http://localhost:8001", "https://cdn.example.com/a.pdf"),
            "https://cdn.example.com/a.pdf"
        );
    }

    #[test]
    fn test_extract_detail() {
        assert_eq!(
            extract_detail(r#"{"detail": "Error calculating alignment score: timeout"}"#),
            "Error calculating alignment score: timeout"
        );
        assert_eq!(extract_detail("Bad Gateway"), "Bad Gateway");
        assert_eq!(extract_detail(""), "empty response body");
    }

    #[test]
    fn test_new_rejects_invalid_token() {
        let config = HttpConfig::new().with_bearer_token("bad\ntoken");
        assert!(matches!(
            HttpEnhancementService::new(config),
            Err(RemoteError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_alignment_without_artifact_is_invalid_request() {
        let service = HttpEnhancementService::new(HttpConfig::new()).unwrap();
        let request = AlignmentRequest {
            enhanced: GeneratedResume {
                enhanced_resume_data: serde_json::json!({}),
                artifact: None,
                download_url: None,
                overleaf_link: None,
            },
            job_data: serde_json::json!({}),
            job_data_v2: serde_json::json!({}),
        };
        let err = service.alignment_score(&request).await.unwrap_err();
        assert!(matches!(err, RemoteError::InvalidRequest(_)));
    }
}
