//! The injected pipeline context.
//!
//! Everything a stage executor touches (checkpoint store, call tracker,
//! remote service, event sink, configuration) is owned by one
//! [`PipelineContext`] passed explicitly to every executor call. There are
//! no ambient globals.

mod identity;

pub use identity::RunIdentity;

use crate::checkpoint::{CheckpointStore, SessionStorage};
use crate::config::{PipelineConfig, MAX_DEPENDENCY_WAIT};
use crate::errors::CheckpointError;
use crate::events::{EventSink, NoOpEventSink};
use crate::models::Submission;
use crate::pipeline::CallTracker;
use crate::remote::EnhancementService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Process-wide state shared by the pipelines of one browsing session.
pub struct PipelineContext {
    config: PipelineConfig,
    store: CheckpointStore,
    tracker: Arc<CallTracker>,
    service: Arc<dyn EnhancementService>,
    event_sink: Arc<dyn EventSink>,
    submissions: watch::Sender<u64>,
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("session_id", &self.config.session_id)
            .field("store", &self.store)
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

impl PipelineContext {
    /// Creates a context over an explicit storage and service.
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        storage: Arc<dyn SessionStorage>,
        service: Arc<dyn EnhancementService>,
    ) -> Self {
        let store = CheckpointStore::new(storage, config.session_id.clone());
        let (submissions, _) = watch::channel(0);
        Self {
            config,
            store,
            tracker: Arc::new(CallTracker::new()),
            service,
            event_sink: Arc::new(NoOpEventSink),
            submissions,
        }
    }

    /// Builds a context from configuration alone: storage per
    /// `storage_path` and the HTTP service per `http`.
    #[cfg(feature = "http")]
    pub async fn from_config(
        config: PipelineConfig,
    ) -> Result<Self, crate::errors::ResumeflowError> {
        config.validate()?;
        let storage = crate::checkpoint::open_storage(&config).await?;
        let service = crate::remote::HttpEnhancementService::new(config.http.clone())?;
        Ok(Self::new(config, storage, Arc::new(service)))
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the checkpoint store.
    #[must_use]
    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Returns the call tracker.
    #[must_use]
    pub fn tracker(&self) -> &Arc<CallTracker> {
        &self.tracker
    }

    /// Returns the remote service.
    #[must_use]
    pub fn service(&self) -> &Arc<dyn EnhancementService> {
        &self.service
    }

    /// Returns the event sink.
    #[must_use]
    pub fn event_sink(&self) -> &Arc<dyn EventSink> {
        &self.event_sink
    }

    /// Emits an event tagged with the session id. Never blocks.
    pub fn try_emit_event(&self, event_type: &str, data: serde_json::Value) {
        let mut enriched = data;
        if let serde_json::Value::Object(ref mut map) = enriched {
            map.insert(
                "session_id".to_string(),
                serde_json::json!(&self.config.session_id),
            );
        }
        self.event_sink.try_emit(event_type, Some(enriched));
    }

    /// Records a submitted job and wakes anything waiting for one.
    pub async fn record_submission(&self, submission: &Submission) -> Result<(), CheckpointError> {
        self.store.put_submission(submission).await?;
        self.submissions.send_modify(|version| *version += 1);
        debug!(session_id = %self.config.session_id, "Submission recorded");
        Ok(())
    }

    /// Returns the recorded submission, waiting at most `wait` (capped at
    /// [`MAX_DEPENDENCY_WAIT`]) for one to be recorded if there is none yet.
    pub async fn wait_for_submission(
        &self,
        wait: Duration,
    ) -> Result<Option<Submission>, CheckpointError> {
        let now = tokio::time::Instant::now();
        let deadline = now.checked_add(wait.min(MAX_DEPENDENCY_WAIT)).unwrap_or(now);
        let mut changes = self.submissions.subscribe();
        loop {
            changes.borrow_and_update();
            if let Some(submission) = self.store.submission().await? {
                return Ok(Some(submission));
            }
            match tokio::time::timeout_at(deadline, changes.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) | Err(_) => return self.store.submission().await,
            }
        }
    }
}
