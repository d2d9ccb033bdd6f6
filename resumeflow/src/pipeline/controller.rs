//! The enhancement pipeline controller.

use super::executor::StageExecutor;
use super::progress::{enhancement_progress, ProgressTracker};
use super::recovery::{classify_start, NavigationIntent, StartMode};
use super::{ActiveRun, Adoption, InterruptionGuard, StageGraph};
use crate::checkpoint::RunMarker;
use crate::context::{PipelineContext, RunIdentity};
use crate::core::{Stage, StageName, StageOutcome, StageStatus};
use crate::errors::ResumeflowError;
use crate::events::types;
use crate::models::{
    AlignmentRequest, AlignmentScores, ComparisonRequest, ContentPreservation, GenerateRequest,
    GeneratedResume, ImprovementAnalysis, Submission,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, OnceCell};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Outcome of one pass over the enhancement graph.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// The run.
    pub identity: RunIdentity,
    /// How the start was classified.
    pub mode: StartMode,
    /// `Generate` outcome.
    pub generate: StageOutcome<GeneratedResume>,
    /// `AlignmentScore` outcome.
    pub alignment: StageOutcome<AlignmentScores>,
    /// `ContentPreservation` outcome.
    pub preservation: StageOutcome<ContentPreservation>,
    /// `ImprovementDiff` outcome.
    pub improvements: StageOutcome<ImprovementAnalysis>,
    /// Progress when the pass ended.
    pub progress: u8,
}

impl RunReport {
    /// Terminal status of every stage.
    #[must_use]
    pub fn statuses(&self) -> BTreeMap<StageName, StageStatus> {
        BTreeMap::from([
            (StageName::Generate, self.generate.status()),
            (StageName::AlignmentScore, self.alignment.status()),
            (StageName::ContentPreservation, self.preservation.status()),
            (StageName::ImprovementDiff, self.improvements.status()),
        ])
    }

    /// Number of completed stages.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.statuses().values().filter(|s| s.is_success()).count()
    }

    /// Number of failed stages.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.statuses()
            .values()
            .filter(|s| **s == StageStatus::Failed)
            .count()
    }

    /// True when every stage completed.
    #[must_use]
    pub fn all_completed(&self) -> bool {
        self.completed_count() == StageName::ENHANCEMENT.len()
    }
}

/// Lazily resolved inputs shared by the stages of one pass.
struct RunInputs<'a> {
    ctx: &'a PipelineContext,
    wait: Duration,
    submission: OnceCell<Option<Submission>>,
}

impl<'a> RunInputs<'a> {
    fn new(ctx: &'a PipelineContext) -> Self {
        Self {
            ctx,
            wait: ctx.config().dependency_wait(),
            submission: OnceCell::new(),
        }
    }

    fn with_submission(ctx: &'a PipelineContext, submission: Submission) -> Self {
        Self {
            ctx,
            wait: ctx.config().dependency_wait(),
            submission: OnceCell::from(Some(submission)),
        }
    }

    /// The submission, waiting boundedly for it when it is not recorded yet.
    async fn submission(&self) -> Option<&Submission> {
        self.submission
            .get_or_init(|| async {
                match self.ctx.wait_for_submission(self.wait).await {
                    Ok(Some(submission)) => Some(submission),
                    Ok(None) => {
                        warn!(wait = ?self.wait, "Submission unavailable after bounded wait");
                        None
                    }
                    Err(e) => {
                        warn!(error = %e, "Submission unreadable");
                        None
                    }
                }
            })
            .await
            .as_ref()
    }
}

/// Orchestrates the enhancement graph over a shared [`PipelineContext`].
///
/// `Generate` runs first. `AlignmentScore` then runs concurrently with the
/// settle-all pair (`ContentPreservation`, `ImprovementDiff`). A failure is
/// local to its stage. Everything is driven inside the caller's task.
#[derive(Debug)]
pub struct PipelineController {
    ctx: Arc<PipelineContext>,
    graph: StageGraph,
    progress: ProgressTracker,
    current: Mutex<Option<Arc<ActiveRun>>>,
}

impl PipelineController {
    /// Creates a controller.
    #[must_use]
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self {
            ctx,
            graph: StageGraph::enhancement(),
            progress: ProgressTracker::new(),
            current: Mutex::new(None),
        }
    }

    /// Returns the context.
    #[must_use]
    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.ctx
    }

    /// Returns the current progress, 0..=100.
    #[must_use]
    pub fn progress(&self) -> u8 {
        self.progress.get()
    }

    /// Subscribes to progress changes.
    #[must_use]
    pub fn subscribe_progress(&self) -> watch::Receiver<u8> {
        self.progress.subscribe()
    }

    /// True while any stage has a remote call outstanding.
    #[must_use]
    pub fn any_in_flight(&self) -> bool {
        self.ctx.tracker().any_in_flight()
    }

    /// A guard for process-ending actions.
    #[must_use]
    pub fn guard(&self) -> InterruptionGuard {
        InterruptionGuard::new(Arc::clone(self.ctx.tracker()))
    }

    /// The run this controller last started or adopted.
    #[must_use]
    pub fn current_run(&self) -> Option<Arc<ActiveRun>> {
        self.current.lock().clone()
    }

    /// Stage records of the current run.
    #[must_use]
    pub fn stages(&self) -> Vec<Stage> {
        self.current_run().map(|run| run.stages()).unwrap_or_default()
    }

    /// True once every stage of the current run is terminal.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.current_run().is_some_and(|run| run.is_settled())
    }

    /// Records a job and returns the intent to start it with.
    ///
    /// Callers that may be restarted keep the intent and pass it to
    /// [`Self::start`] again after the restart.
    pub async fn prepare_submission(
        &self,
        submission: &Submission,
    ) -> Result<NavigationIntent, ResumeflowError> {
        self.ctx.record_submission(submission).await?;
        Ok(NavigationIntent::fresh())
    }

    /// Records a job and runs it as a fresh submission.
    pub async fn submit(&self, submission: &Submission) -> Result<RunReport, ResumeflowError> {
        let intent = self.prepare_submission(submission).await?;
        self.start(intent).await
    }

    /// Resumes after a reload or on direct entry.
    pub async fn resume(&self) -> Result<RunReport, ResumeflowError> {
        self.start(NavigationIntent::Reload).await
    }

    /// Classifies the start and runs every stage that is not yet terminal.
    ///
    /// Stage failures are reported in the [`RunReport`]; `Err` means the
    /// checkpoint store itself is unusable or a fresh submission has no
    /// recorded job.
    #[instrument(skip(self), fields(session_id = %self.ctx.config().session_id))]
    pub async fn start(&self, intent: NavigationIntent) -> Result<RunReport, ResumeflowError> {
        let marker = self.ctx.store().marker(self.graph.scope()).await?;
        let mode = classify_start(intent, marker.as_ref());
        info!(?mode, "Run start classified");
        self.ctx.try_emit_event(
            types::RUN_CLASSIFIED,
            serde_json::json!({ "mode": mode }),
        );

        let (run, inputs) = match mode {
            StartMode::FreshSubmission { run_id } => {
                let (run, submission) = self.begin_fresh(run_id).await?;
                (run, RunInputs::with_submission(&self.ctx, submission))
            }
            StartMode::Resumed { run_id, .. } => (self.adopt(Some(run_id)), RunInputs::new(&self.ctx)),
            StartMode::DirectEntry => (self.adopt(None), RunInputs::new(&self.ctx)),
        };

        let report = self.execute(&run, &inputs, mode).await;
        info!(
            run_id = %run.run_id(),
            completed = report.completed_count(),
            failed = report.failed_count(),
            "Run pass finished"
        );
        self.ctx.try_emit_event(
            types::RUN_FINISHED,
            serde_json::json!({
                "run_id": run.run_id().to_string(),
                "statuses": report.statuses(),
            }),
        );
        Ok(report)
    }

    /// Starts a new run: invalidates prior checkpoints and tracker entries,
    /// resets stage states and progress, and records the `processed` marker.
    async fn begin_fresh(
        &self,
        run_id: Uuid,
    ) -> Result<(Arc<ActiveRun>, Submission), ResumeflowError> {
        let store = self.ctx.store();
        let submission = store
            .submission()
            .await?
            .ok_or_else(|| ResumeflowError::MissingSubmission {
                session_id: store.session_id().to_string(),
            })?;

        let identity = RunIdentity::with_run_id(store.session_id(), run_id);
        let run = Arc::new(ActiveRun::new(identity, Adoption::OwnRun, &self.graph));
        self.install(Arc::clone(&run));

        // Dropping the marker with the entries makes every other run on this
        // scope stale from here on.
        let scope = self.graph.scope();
        store.invalidate(scope).await?;
        self.ctx.tracker().reset(scope.stages());
        self.progress.reset();
        store.set_marker(scope, &RunMarker::new(run_id)).await?;

        info!(run_id = %run_id, "Prior checkpoints invalidated for fresh submission");
        self.ctx.try_emit_event(
            types::RUN_INVALIDATED,
            serde_json::json!({ "run_id": run_id.to_string() }),
        );
        Ok((run, submission))
    }

    /// Reuses the current run when it is the one being resumed, otherwise
    /// installs a run for `run_id`. A run resumed from a marker adopts only
    /// its own checkpoints; a direct-entry run (`None`) gets a new id and
    /// adopts any.
    fn adopt(&self, run_id: Option<Uuid>) -> Arc<ActiveRun> {
        if let Some(current) = self.current_run() {
            let same_run = match run_id {
                Some(id) => id == current.run_id(),
                None => current.adoption() == Adoption::AnyRun,
            };
            if same_run && !current.is_superseded() {
                return current;
            }
        }
        let session_id = self.ctx.config().session_id.clone();
        let (identity, adoption) = match run_id {
            Some(id) => (RunIdentity::with_run_id(session_id, id), Adoption::OwnRun),
            None => (RunIdentity::new(session_id), Adoption::AnyRun),
        };
        let run = Arc::new(ActiveRun::new(identity, adoption, &self.graph));
        self.install(Arc::clone(&run));
        self.progress.reset();
        run
    }

    fn install(&self, run: Arc<ActiveRun>) {
        if let Some(previous) = self.current.lock().replace(run) {
            previous.supersede();
        }
    }

    async fn execute(&self, run: &ActiveRun, inputs: &RunInputs<'_>, mode: StartMode) -> RunReport {
        let generate = self.run_generate(run, inputs).await;
        self.report_progress(run, enhancement_progress(0));
        let generated = generate.result();

        let settled = AtomicU8::new(0);
        let stage_settled = || {
            let count = settled.fetch_add(1, Ordering::SeqCst) + 1;
            self.report_progress(run, enhancement_progress(count));
        };

        let alignment = async {
            let outcome = self.run_alignment(run, inputs, generated).await;
            stage_settled();
            outcome
        };
        // Settle-all join: both halves are awaited whatever the other does.
        let fan_out = async {
            let preservation = async {
                let outcome = self.run_preservation(run, inputs, generated).await;
                stage_settled();
                outcome
            };
            let improvements = async {
                let outcome = self.run_improvements(run, inputs, generated).await;
                stage_settled();
                outcome
            };
            futures::join!(preservation, improvements)
        };
        let (alignment, (preservation, improvements)) = futures::join!(alignment, fan_out);

        RunReport {
            identity: run.identity().clone(),
            mode,
            generate,
            alignment,
            preservation,
            improvements,
            progress: self.progress.get(),
        }
    }

    async fn run_generate(
        &self,
        run: &ActiveRun,
        inputs: &RunInputs<'_>,
    ) -> StageOutcome<GeneratedResume> {
        let executor = StageExecutor::new(&self.ctx, run, StageName::Generate);
        if let Some(outcome) = executor.cached().await {
            return outcome;
        }
        let Some(submission) = inputs.submission().await else {
            return executor.fail_unavailable().await;
        };

        let request = GenerateRequest {
            resume_data: submission.original_resume().clone(),
            missing_information: submission.missing_information(),
            job_data: submission.analysis.job_data.clone(),
        };
        let service = Arc::clone(self.ctx.service());
        executor
            .execute(move || async move { service.generate(&request).await })
            .await
    }

    async fn run_alignment(
        &self,
        run: &ActiveRun,
        inputs: &RunInputs<'_>,
        generated: Option<&GeneratedResume>,
    ) -> StageOutcome<AlignmentScores> {
        let executor = StageExecutor::new(&self.ctx, run, StageName::AlignmentScore);
        if let Some(outcome) = executor.cached().await {
            return outcome;
        }
        let Some(generated) = generated else {
            return executor.fail_unavailable().await;
        };
        let Some(submission) = inputs.submission().await else {
            return executor.fail_unavailable().await;
        };

        let request = AlignmentRequest {
            enhanced: generated.clone(),
            job_data: submission.analysis.job_data.clone(),
            job_data_v2: submission.analysis.job_data_v2.clone(),
        };
        let service = Arc::clone(self.ctx.service());
        executor
            .execute(move || async move { service.alignment_score(&request).await })
            .await
    }

    async fn comparison(
        inputs: &RunInputs<'_>,
        generated: Option<&GeneratedResume>,
    ) -> Option<ComparisonRequest> {
        let generated = generated?;
        let submission = inputs.submission().await?;
        Some(ComparisonRequest {
            original_resume_data: submission.original_resume().clone(),
            enhanced_resume_data: generated.enhanced_resume_data.clone(),
        })
    }

    async fn run_preservation(
        &self,
        run: &ActiveRun,
        inputs: &RunInputs<'_>,
        generated: Option<&GeneratedResume>,
    ) -> StageOutcome<ContentPreservation> {
        let executor = StageExecutor::new(&self.ctx, run, StageName::ContentPreservation);
        if let Some(outcome) = executor.cached().await {
            return outcome;
        }
        let Some(request) = Self::comparison(inputs, generated).await else {
            return executor.fail_unavailable().await;
        };
        let service = Arc::clone(self.ctx.service());
        executor
            .execute(move || async move { service.content_preservation(&request).await })
            .await
    }

    async fn run_improvements(
        &self,
        run: &ActiveRun,
        inputs: &RunInputs<'_>,
        generated: Option<&GeneratedResume>,
    ) -> StageOutcome<ImprovementAnalysis> {
        let executor = StageExecutor::new(&self.ctx, run, StageName::ImprovementDiff);
        if let Some(outcome) = executor.cached().await {
            return outcome;
        }
        let Some(request) = Self::comparison(inputs, generated).await else {
            return executor.fail_unavailable().await;
        };
        let service = Arc::clone(self.ctx.service());
        executor
            .execute(move || async move { service.improvement_diff(&request).await })
            .await
    }

    fn report_progress(&self, run: &ActiveRun, percent: u8) {
        if run.is_superseded() {
            return;
        }
        let current = self.progress.report(percent);
        self.ctx.try_emit_event(
            types::PIPELINE_PROGRESS,
            serde_json::json!({
                "run_id": run.run_id().to_string(),
                "progress": current,
            }),
        );
    }
}
