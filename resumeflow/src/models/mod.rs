//! Payload models exchanged with the remote resume services.
//!
//! Resume and job structures are produced and consumed by the remote side;
//! the pipeline keeps them as opaque JSON and only types the parts it reads.

mod enhancement;
mod resume;

pub use enhancement::{
    AlignmentRequest, AlignmentScores, ComparisonRequest, ContentPreservation, GenerateRequest,
    GeneratedResume, GroupAlignment, ImprovementAnalysis,
};
pub use resume::{
    CvComment, EvaluationRequest, EvaluationResult, MissingInfoItem, ResumeArtifact, Submission,
    SupplementalAnswer,
};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A payload that can be checkpointed as a stage result.
///
/// `validate` rejects values that deserialize but are structurally unusable;
/// such checkpoints are treated as absent.
pub trait StagePayload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Checks structural validity.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

fn require_object(value: &serde_json::Value, what: &str) -> Result<(), String> {
    if value.is_object() {
        Ok(())
    } else {
        Err(format!("{what} must be a JSON object"))
    }
}
