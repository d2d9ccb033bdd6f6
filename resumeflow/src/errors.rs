//! Error types for resumeflow.
//!
//! Stage-scoped failures are recorded as [`crate::core::StageOutcome::Failed`]
//! values and never surface here. These errors describe faults of the
//! surrounding system: storage, configuration and remote transport.

use thiserror::Error;

pub use crate::remote::RemoteError;

/// The main error type for resumeflow operations.
#[derive(Debug, Error)]
pub enum ResumeflowError {
    /// A checkpoint storage error.
    #[error("{0}")]
    Checkpoint(#[from] CheckpointError),

    /// A configuration error.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A remote call failed outside a stage executor.
    #[error("{0}")]
    Remote(#[from] RemoteError),

    /// The submission required to start a run is missing.
    #[error("No submission recorded for session '{session_id}'")]
    MissingSubmission {
        /// The session id.
        session_id: String,
    },
}

/// Errors raised by checkpoint storage.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The backing storage could not be read or written.
    #[error("Checkpoint storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A value could not be serialized.
    #[error("Checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while loading configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// An environment variable or field had an unparsable value.
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        /// The variable or field name.
        key: String,
        /// The offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A configuration document could not be parsed.
    #[error("Invalid configuration document: {0}")]
    Parse(String),
}

impl ConfigError {
    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid_value(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}
