//! The single-stage analysis pipeline.

use super::executor::StageExecutor;
use super::{ActiveRun, Adoption, StageGraph};
use crate::checkpoint::RunMarker;
use crate::context::{PipelineContext, RunIdentity};
use crate::core::{StageName, StageOutcome};
use crate::errors::ResumeflowError;
use crate::events::types;
use crate::models::{EvaluationRequest, EvaluationResult};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Runs `Evaluate` under the same executor contract as the enhancement
/// stages: a cached result is reused, concurrent requests share one call,
/// and a failure is recorded rather than retried.
///
/// The analysis scope has its own marker, so a submission through one
/// pipeline replaces runs of every other pipeline sharing the context.
#[derive(Debug)]
pub struct AnalysisPipeline {
    ctx: Arc<PipelineContext>,
    graph: StageGraph,
    current: Mutex<Option<Arc<ActiveRun>>>,
}

impl AnalysisPipeline {
    /// Creates an analysis pipeline over a shared context.
    #[must_use]
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self {
            ctx,
            graph: StageGraph::analysis(),
            current: Mutex::new(None),
        }
    }

    /// Evaluates `request` as a new submission, discarding any earlier
    /// evaluation of this session.
    #[instrument(skip(self, request), fields(session_id = %self.ctx.config().session_id))]
    pub async fn submit(
        &self,
        request: &EvaluationRequest,
    ) -> Result<StageOutcome<EvaluationResult>, ResumeflowError> {
        let store = self.ctx.store();
        let scope = self.graph.scope();
        let run = Arc::new(ActiveRun::new(
            RunIdentity::new(store.session_id()),
            Adoption::OwnRun,
            &self.graph,
        ));
        if let Some(previous) = self.current.lock().replace(Arc::clone(&run)) {
            previous.supersede();
        }
        store.invalidate(scope).await?;
        self.ctx.tracker().reset(scope.stages());
        store.set_marker(scope, &RunMarker::new(run.run_id())).await?;
        info!(run_id = %run.run_id(), "Analysis checkpoint invalidated");
        self.ctx.try_emit_event(
            types::RUN_INVALIDATED,
            serde_json::json!({ "run_id": run.run_id().to_string(), "scope": "analysis" }),
        );
        Ok(self.evaluate(&run, request).await)
    }

    /// Evaluates `request`, reusing a checkpointed evaluation if one exists.
    ///
    /// When a submission owns the analysis scope, only its evaluation is
    /// reused.
    pub async fn analyze(&self, request: &EvaluationRequest) -> StageOutcome<EvaluationResult> {
        let owner = match self.ctx.store().marker(self.graph.scope()).await {
            Ok(marker) => marker.map(|m| m.run_id),
            Err(e) => {
                warn!(error = %e, "Analysis marker unreadable, entering directly");
                None
            }
        };
        let run = self.adopt(owner);
        self.evaluate(&run, request).await
    }

    fn adopt(&self, owner: Option<Uuid>) -> Arc<ActiveRun> {
        let mut current = self.current.lock();
        if let Some(run) = current.as_ref() {
            if !run.is_superseded() && run.is_owner(owner) {
                return Arc::clone(run);
            }
        }
        let session_id = self.ctx.store().session_id();
        let (identity, adoption) = match owner {
            Some(id) => (RunIdentity::with_run_id(session_id, id), Adoption::OwnRun),
            None => (RunIdentity::new(session_id), Adoption::AnyRun),
        };
        let run = Arc::new(ActiveRun::new(identity, adoption, &self.graph));
        *current = Some(Arc::clone(&run));
        run
    }

    async fn evaluate(
        &self,
        run: &ActiveRun,
        request: &EvaluationRequest,
    ) -> StageOutcome<EvaluationResult> {
        let executor = StageExecutor::new(&self.ctx, run, StageName::Evaluate);
        let service = Arc::clone(self.ctx.service());
        let request = request.clone();
        executor
            .execute(move || async move { service.evaluate(&request).await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::InMemorySessionStorage;
    use crate::config::PipelineConfig;
    use crate::pipeline::RUN_SUPERSEDED;
    use crate::remote::RemoteError;
    use crate::testing::{sample_evaluation_request, ScriptedService};

    fn pipeline(service: ScriptedService) -> (AnalysisPipeline, Arc<ScriptedService>) {
        let service = Arc::new(service);
        let ctx = PipelineContext::new(
            PipelineConfig::new(),
            Arc::new(InMemorySessionStorage::new()),
            service.clone(),
        );
        (AnalysisPipeline::new(Arc::new(ctx)), service)
    }

    #[tokio::test]
    async fn test_analyze_reuses_checkpoint() {
        let (pipeline, service) = pipeline(ScriptedService::new());
        let request = sample_evaluation_request();

        let first = pipeline.analyze(&request).await;
        let second = pipeline.analyze(&request).await;

        assert!(first.is_completed());
        assert_eq!(first, second);
        assert_eq!(service.calls(StageName::Evaluate), 1);
    }

    #[tokio::test]
    async fn test_submit_discards_previous_evaluation() {
        let (pipeline, service) = pipeline(ScriptedService::new());
        let request = sample_evaluation_request();

        pipeline.analyze(&request).await;
        let outcome = pipeline.submit(&request).await.unwrap();

        assert!(outcome.is_completed());
        assert_eq!(service.calls(StageName::Evaluate), 2);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_not_retried() {
        let (pipeline, service) = pipeline(
            ScriptedService::new()
                .with_failure(StageName::Evaluate, RemoteError::status(422, "Unprocessable")),
        );
        let request = sample_evaluation_request();

        let first = pipeline.analyze(&request).await;
        let second = pipeline.analyze(&request).await;

        assert_eq!(first.reason(), Some("HTTP 422: Unprocessable"));
        assert_eq!(first, second);
        assert_eq!(service.calls(StageName::Evaluate), 1);
    }

    #[tokio::test]
    async fn test_replaced_submission_does_not_overwrite_newer_one() {
        let service = Arc::new(ScriptedService::new().with_gate_on_first_call(StageName::Evaluate));
        let ctx = Arc::new(PipelineContext::new(
            PipelineConfig::new(),
            Arc::new(InMemorySessionStorage::new()),
            service.clone(),
        ));
        let first = AnalysisPipeline::new(ctx.clone());
        let second = AnalysisPipeline::new(ctx.clone());
        let request = sample_evaluation_request();

        let replace = async {
            service.wait_for_calls(StageName::Evaluate, 1).await;
            let outcome = second.submit(&request).await;
            service.open_gate(StageName::Evaluate);
            outcome
        };
        let (replaced, current) = tokio::join!(first.submit(&request), replace);
        assert!(replaced.unwrap().is_completed());
        assert!(current.unwrap().is_completed());

        let owner = ctx
            .store()
            .marker(&crate::checkpoint::RunScope::analysis())
            .await
            .unwrap()
            .unwrap();
        let stored = ctx.store().get(StageName::Evaluate).await.unwrap().unwrap();
        assert_eq!(stored.run_id, owner.run_id);
        assert_eq!(service.calls(StageName::Evaluate), 2);

        // The replaced pipeline now follows the newer submission.
        assert!(first.analyze(&request).await.is_completed());
        assert_eq!(service.calls(StageName::Evaluate), 2);
    }

    #[tokio::test]
    async fn test_stale_run_does_not_call_after_replacement() {
        let (pipeline, service) = pipeline(ScriptedService::new());
        let request = sample_evaluation_request();
        let stale = ActiveRun::new(
            RunIdentity::new(pipeline.ctx.store().session_id()),
            Adoption::OwnRun,
            &pipeline.graph,
        );

        pipeline.submit(&request).await.unwrap();
        pipeline.ctx.store().clear(&[StageName::Evaluate]).await.unwrap();
        let outcome = pipeline.evaluate(&stale, &request).await;

        assert_eq!(outcome.reason(), Some(RUN_SUPERSEDED));
        assert_eq!(service.calls(StageName::Evaluate), 1);
    }
}
