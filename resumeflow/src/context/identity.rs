//! Run identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one run of a pipeline within a browsing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    /// The run id. Time-ordered (UUID v7).
    pub run_id: Uuid,
    /// The session the run belongs to.
    pub session_id: String,
    /// When this process started or adopted the run.
    pub started_at: DateTime<Utc>,
}

impl RunIdentity {
    /// Creates an identity with a fresh run id.
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self::with_run_id(session_id, Uuid::now_v7())
    }

    /// Creates an identity for an existing run id.
    #[must_use]
    pub fn with_run_id(session_id: impl Into<String>, run_id: Uuid) -> Self {
        Self {
            run_id,
            session_id: session_id.into(),
            started_at: Utc::now(),
        }
    }

    /// Converts to a JSON object for event payloads.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "run_id": self.run_id.to_string(),
            "session_id": self.session_id,
        })
    }
}
