//! Typed checkpoint access over a session storage.

use super::SessionStorage;
use crate::core::{StageName, StageOutcome, StageStatus};
use crate::errors::CheckpointError;
use crate::models::{StagePayload, Submission};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// The durable record of one stage's outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    /// The stage the entry belongs to.
    pub stage: StageName,
    /// `Completed` or `Failed`.
    pub status: StageStatus,
    /// The result payload, present iff completed.
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// The failure reason, present iff failed.
    #[serde(default)]
    pub reason: Option<String>,
    /// The run that wrote the entry.
    pub run_id: Uuid,
    /// When the entry was written.
    pub written_at: DateTime<Utc>,
}

impl CheckpointEntry {
    /// Creates a completed entry.
    #[must_use]
    pub fn completed(stage: StageName, result: serde_json::Value, run_id: Uuid) -> Self {
        Self {
            stage,
            status: StageStatus::Completed,
            result: Some(result),
            reason: None,
            run_id,
            written_at: Utc::now(),
        }
    }

    /// Creates a failed entry.
    #[must_use]
    pub fn failed(stage: StageName, reason: impl Into<String>, run_id: Uuid) -> Self {
        Self {
            stage,
            status: StageStatus::Failed,
            result: None,
            reason: Some(reason.into()),
            run_id,
            written_at: Utc::now(),
        }
    }

    /// Converts the entry into a typed outcome.
    ///
    /// Returns an error describing why the entry is unusable: wrong stage,
    /// non-terminal status, missing fields or an invalid payload.
    pub fn to_outcome<T: StagePayload>(&self, expected: StageName) -> Result<StageOutcome<T>, String> {
        if self.stage != expected {
            return Err(format!("entry belongs to stage {}", self.stage));
        }
        match (self.status, &self.result, &self.reason) {
            (StageStatus::Completed, Some(result), _) => {
                let payload: T =
                    serde_json::from_value(result.clone()).map_err(|e| e.to_string())?;
                payload.validate()?;
                Ok(StageOutcome::completed(payload))
            }
            (StageStatus::Failed, _, Some(reason)) => Ok(StageOutcome::failed(reason.clone())),
            (status, _, _) => Err(format!("entry with status {status} is incomplete")),
        }
    }
}

/// A typed outcome read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredOutcome<T> {
    /// The outcome.
    pub outcome: StageOutcome<T>,
    /// The run that wrote it.
    pub run_id: Uuid,
    /// When it was written.
    pub written_at: DateTime<Utc>,
}

/// Marks that a submitted run has already been picked up for processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMarker {
    /// The run the marker belongs to.
    pub run_id: Uuid,
    /// When the run was submitted.
    pub submitted_at: DateTime<Utc>,
}

impl RunMarker {
    /// Creates a marker stamped now.
    #[must_use]
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            submitted_at: Utc::now(),
        }
    }
}

/// The set of stages a run owns, plus the marker naming the run that owns
/// them. Invalidation never touches anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunScope {
    stages: Vec<StageName>,
    marker: &'static str,
}

impl RunScope {
    /// The enhancement pipeline's stages and its `processed` marker.
    #[must_use]
    pub fn enhancement() -> Self {
        Self {
            stages: StageName::ENHANCEMENT.to_vec(),
            marker: "processed",
        }
    }

    /// The analysis pipeline's single stage and its own marker.
    #[must_use]
    pub fn analysis() -> Self {
        Self {
            stages: vec![StageName::Evaluate],
            marker: "analysis:processed",
        }
    }

    /// The stages in scope.
    #[must_use]
    pub fn stages(&self) -> &[StageName] {
        &self.stages
    }
}

/// Typed, session-scoped access to checkpoints, the submission and markers.
#[derive(Clone)]
pub struct CheckpointStore {
    storage: Arc<dyn SessionStorage>,
    session_id: String,
}

impl std::fmt::Debug for CheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointStore")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

impl CheckpointStore {
    /// Creates a store for one session.
    #[must_use]
    pub fn new(storage: Arc<dyn SessionStorage>, session_id: impl Into<String>) -> Self {
        Self {
            storage,
            session_id: session_id.into(),
        }
    }

    /// Returns the session id.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Storage key of a stage's checkpoint.
    #[must_use]
    pub fn checkpoint_key(&self, stage: StageName) -> String {
        format!("{}:checkpoint:{}", self.session_id, stage)
    }

    fn submission_key(&self) -> String {
        format!("{}:submission", self.session_id)
    }

    fn marker_key(&self, scope: &RunScope) -> String {
        format!("{}:{}", self.session_id, scope.marker)
    }

    /// Reads the raw entry for a stage.
    ///
    /// Entries that fail to parse are logged and reported as absent.
    pub async fn get(&self, stage: StageName) -> Result<Option<CheckpointEntry>, CheckpointError> {
        let key = self.checkpoint_key(stage);
        let Some(raw) = self.storage.get(&key).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<CheckpointEntry>(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                warn!(stage = %stage, error = %e, "Ignoring malformed checkpoint entry");
                Ok(None)
            }
        }
    }

    /// Reads a stage's outcome, typed and validated.
    ///
    /// Entries whose payload does not deserialize into `T` or fails
    /// [`StagePayload::validate`] are logged and reported as absent.
    pub async fn get_outcome<T: StagePayload>(
        &self,
        stage: StageName,
    ) -> Result<Option<StoredOutcome<T>>, CheckpointError> {
        let Some(entry) = self.get(stage).await? else {
            return Ok(None);
        };
        match entry.to_outcome::<T>(stage) {
            Ok(outcome) => Ok(Some(StoredOutcome {
                outcome,
                run_id: entry.run_id,
                written_at: entry.written_at,
            })),
            Err(reason) => {
                warn!(stage = %stage, reason = %reason, "Ignoring invalid checkpoint entry");
                Ok(None)
            }
        }
    }

    /// Writes the entry for its stage, replacing any previous one.
    pub async fn put(&self, entry: &CheckpointEntry) -> Result<(), CheckpointError> {
        let value = serde_json::to_string(entry)?;
        self.storage
            .set(&self.checkpoint_key(entry.stage), value)
            .await?;
        debug!(stage = %entry.stage, status = %entry.status, run_id = %entry.run_id, "Checkpoint written");
        Ok(())
    }

    /// Removes the entries of the given stages.
    pub async fn clear(&self, stages: &[StageName]) -> Result<(), CheckpointError> {
        let keys: Vec<String> = stages.iter().map(|s| self.checkpoint_key(*s)).collect();
        self.storage.remove_many(&keys).await
    }

    /// Invalidates everything a run owns: its checkpoints and its marker.
    /// The submission is kept.
    pub async fn invalidate(&self, scope: &RunScope) -> Result<(), CheckpointError> {
        let mut keys: Vec<String> = scope
            .stages()
            .iter()
            .map(|s| self.checkpoint_key(*s))
            .collect();
        keys.push(self.marker_key(scope));
        self.storage.remove_many(&keys).await?;
        debug!(session_id = %self.session_id, stages = scope.stages().len(), "Run scope invalidated");
        Ok(())
    }

    /// Reads the submitted job. An invalid record is reported as absent.
    pub async fn submission(&self) -> Result<Option<Submission>, CheckpointError> {
        let Some(raw) = self.storage.get(&self.submission_key()).await? else {
            return Ok(None);
        };
        let parsed = serde_json::from_str::<Submission>(&raw)
            .map_err(|e| e.to_string())
            .and_then(|s| s.validate().map(|()| s));
        match parsed {
            Ok(submission) => Ok(Some(submission)),
            Err(reason) => {
                warn!(reason = %reason, "Ignoring invalid submission record");
                Ok(None)
            }
        }
    }

    /// Records the submitted job.
    pub async fn put_submission(&self, submission: &Submission) -> Result<(), CheckpointError> {
        let value = serde_json::to_string(submission)?;
        self.storage.set(&self.submission_key(), value).await
    }

    /// Reads the marker of `scope`: the run that currently owns it.
    pub async fn marker(&self, scope: &RunScope) -> Result<Option<RunMarker>, CheckpointError> {
        let Some(raw) = self.storage.get(&self.marker_key(scope)).await? else {
            return Ok(None);
        };
        Ok(serde_json::from_str(&raw)
            .map_err(|e| warn!(error = %e, "Ignoring malformed processed marker"))
            .ok())
    }

    /// Writes the marker of `scope`.
    pub async fn set_marker(
        &self,
        scope: &RunScope,
        marker: &RunMarker,
    ) -> Result<(), CheckpointError> {
        let value = serde_json::to_string(marker)?;
        self.storage.set(&self.marker_key(scope), value).await
    }
}
