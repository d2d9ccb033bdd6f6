//! The per-stage executor.
//!
//! One invocation walks `NotStarted -> Dispatching -> AwaitingRemote ->
//! {Completed | Failed}`:
//!
//! 1. An adoptable checkpoint is returned as is; no remote call is made.
//! 2. If the stage is already in flight in this process, the executor joins
//!    that call instead of dispatching a second one.
//! 3. Otherwise it claims the stage and issues the remote call.
//! 4. A result is checkpointed before it is published to joiners or returned.
//! 5. A failure is checkpointed with its reason and returned as a value; it
//!    is never retried and never affects sibling stages.
//!
//! A run whose scope marker names another run has been replaced. It stops
//! dispatching and its late results are not written.

use super::tracker::{CallPermit, Dispatch};
use super::ActiveRun;
use crate::checkpoint::CheckpointEntry;
use crate::context::PipelineContext;
use crate::core::{ExecutorState, StageName, StageOutcome};
use crate::events::types;
use crate::models::StagePayload;
use crate::observability::SpanTimer;
use crate::remote::RemoteError;
use std::future::Future;
use tracing::{debug, error, info, instrument, warn};

/// Failure reason recorded when a stage's inputs cannot be obtained.
pub const DEPENDENCY_UNAVAILABLE: &str = "dependency unavailable";

/// Failure reason reported, never persisted, by a run that was replaced
/// before the stage could be dispatched.
pub const RUN_SUPERSEDED: &str = "run superseded";

/// Runs one stage of one run against the shared context.
#[derive(Debug)]
pub struct StageExecutor<'a> {
    ctx: &'a PipelineContext,
    run: &'a ActiveRun,
    stage: StageName,
}

impl<'a> StageExecutor<'a> {
    /// Creates an executor.
    #[must_use]
    pub fn new(ctx: &'a PipelineContext, run: &'a ActiveRun, stage: StageName) -> Self {
        Self { ctx, run, stage }
    }

    /// The stage this executor runs.
    #[must_use]
    pub fn stage(&self) -> StageName {
        self.stage
    }

    /// Resolves the stage, calling `call` only if there is neither an
    /// adoptable checkpoint nor a call already in flight.
    #[instrument(skip_all, fields(stage = %self.stage, run_id = %self.run.run_id()))]
    pub async fn execute<T, F, Fut>(&self, call: F) -> StageOutcome<T>
    where
        T: StagePayload,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let permit = match self.claim::<T>().await {
            Ok(permit) => permit,
            Err(resolved) => return resolved,
        };

        self.run
            .update(self.stage, |s| s.set_in_flight(ExecutorState::Dispatching));
        self.emit(types::STAGE_DISPATCHED, serde_json::json!({}));
        info!("Dispatching remote call");

        self.run
            .update(self.stage, |s| s.set_in_flight(ExecutorState::AwaitingRemote));
        let timer = SpanTimer::start(format!("stage.{}", self.stage));
        let result = call()
            .await
            .and_then(|payload| {
                payload
                    .validate()
                    .map(|()| payload)
                    .map_err(RemoteError::InvalidResponse)
            });
        let duration_ms = timer.finish();

        match result {
            Ok(payload) => match serde_json::to_value(&payload) {
                Ok(value) => self.record_success(permit, payload, value, duration_ms).await,
                Err(e) => {
                    self.record_failure(permit, format!("Unserializable result: {e}"))
                        .await
                }
            },
            Err(err) => self.record_failure(permit, err.to_string()).await,
        }
    }

    /// Resolves the stage as failed because its inputs are unavailable,
    /// unless a checkpoint or an in-flight call already resolves it.
    #[instrument(skip_all, fields(stage = %self.stage, run_id = %self.run.run_id()))]
    pub async fn fail_unavailable<T: StagePayload>(&self) -> StageOutcome<T> {
        match self.claim::<T>().await {
            Ok(permit) => {
                self.record_failure(permit, DEPENDENCY_UNAVAILABLE.to_string())
                    .await
            }
            Err(resolved) => resolved,
        }
    }

    /// Returns the adoptable checkpointed outcome, if any.
    pub async fn cached<T: StagePayload>(&self) -> Option<StageOutcome<T>> {
        let stored = match self.ctx.store().get_outcome::<T>(self.stage).await {
            Ok(Some(stored)) => stored,
            Ok(None) => return None,
            Err(e) => {
                warn!(stage = %self.stage, error = %e, "Checkpoint unreadable, recomputing");
                return None;
            }
        };

        if !self.run.accepts_checkpoint_from(stored.run_id) {
            debug!(stage = %self.stage, writer = %stored.run_id, "Ignoring checkpoint of another run");
            return None;
        }

        self.apply(&stored.outcome);
        self.emit(
            types::STAGE_CACHE_HIT,
            serde_json::json!({
                "status": stored.outcome.status(),
                "written_by": stored.run_id.to_string(),
            }),
        );
        debug!(stage = %self.stage, status = %stored.outcome.status(), "Adopted checkpoint");
        Some(stored.outcome)
    }

    /// Claims the stage for dispatch. `Err` carries an outcome that already
    /// resolves the stage (adopted checkpoint, joined call, or the run was
    /// replaced).
    async fn claim<T: StagePayload>(&self) -> Result<CallPermit<'a>, StageOutcome<T>> {
        if let Some(outcome) = self.cached::<T>().await {
            return Err(outcome);
        }

        let tracker: &'a super::CallTracker = self.ctx.tracker();
        loop {
            if !self.is_current().await {
                debug!(stage = %self.stage, "Run replaced, not dispatching");
                self.run.update(self.stage, |s| s.fail(RUN_SUPERSEDED));
                return Err(StageOutcome::failed(RUN_SUPERSEDED));
            }
            match tracker.begin(self.stage) {
                Dispatch::Acquired(permit) => return Ok(permit),
                Dispatch::InFlight(waiter) => {
                    self.emit(types::STAGE_JOINED, serde_json::json!({}));
                    debug!(stage = %self.stage, "Joining in-flight call");
                    if let Some(settled) = waiter.wait().await {
                        return Err(self.adopt_joined(settled));
                    }
                    // The owner gave up without settling, or the stage was reset.
                    if let Some(outcome) = self.cached::<T>().await {
                        return Err(outcome);
                    }
                }
            }
        }
    }

    fn adopt_joined<T: StagePayload>(
        &self,
        settled: StageOutcome<serde_json::Value>,
    ) -> StageOutcome<T> {
        let outcome = match settled {
            StageOutcome::Completed { result } => match serde_json::from_value::<T>(result) {
                Ok(payload) => StageOutcome::completed(payload),
                Err(e) => StageOutcome::failed(format!("Invalid joined result: {e}")),
            },
            StageOutcome::Failed { reason } => StageOutcome::failed(reason),
        };
        self.apply(&outcome);
        outcome
    }

    async fn record_success<T: StagePayload>(
        &self,
        permit: CallPermit<'_>,
        payload: T,
        value: serde_json::Value,
        duration_ms: f64,
    ) -> StageOutcome<T> {
        self.persist(CheckpointEntry::completed(
            self.stage,
            value.clone(),
            self.run.run_id(),
        ))
        .await;
        self.run.update(self.stage, |s| s.complete(value.clone()));
        permit.settle(StageOutcome::completed(value));

        self.emit(
            types::STAGE_COMPLETED,
            serde_json::json!({ "duration_ms": duration_ms }),
        );
        info!(duration_ms, "Stage completed");
        StageOutcome::completed(payload)
    }

    async fn record_failure<T>(&self, permit: CallPermit<'_>, reason: String) -> StageOutcome<T> {
        self.persist(CheckpointEntry::failed(
            self.stage,
            reason.clone(),
            self.run.run_id(),
        ))
        .await;
        self.run.update(self.stage, |s| s.fail(reason.clone()));
        permit.settle(StageOutcome::failed(reason.clone()));

        self.emit(types::STAGE_FAILED, serde_json::json!({ "reason": reason }));
        warn!(reason = %reason, "Stage failed");
        StageOutcome::failed(reason)
    }

    /// Returns false once the run no longer owns its scope. The stored
    /// marker decides, so a run replaced through another controller sharing
    /// the context is caught as well.
    async fn is_current(&self) -> bool {
        if self.run.is_superseded() {
            return false;
        }
        let owner = match self.ctx.store().marker(self.run.scope()).await {
            Ok(marker) => marker.map(|m| m.run_id),
            Err(e) => {
                warn!(stage = %self.stage, error = %e, "Run marker unreadable, assuming run is current");
                return true;
            }
        };
        if self.run.is_owner(owner) {
            return true;
        }
        info!(stage = %self.stage, owner = ?owner, "Run replaced by a newer submission");
        self.run.supersede();
        false
    }

    async fn persist(&self, entry: CheckpointEntry) {
        if !self.is_current().await {
            warn!(stage = %self.stage, "Run superseded, dropping checkpoint");
            return;
        }
        if let Err(e) = self.ctx.store().put(&entry).await {
            // The outcome still stands for this process; only durability is lost.
            error!(stage = %self.stage, error = %e, "Failed to write checkpoint");
        }
    }

    fn apply<T: serde::Serialize>(&self, outcome: &StageOutcome<T>) {
        match outcome {
            StageOutcome::Completed { result } => {
                let value = serde_json::to_value(result).unwrap_or(serde_json::Value::Null);
                self.run.update(self.stage, |s| s.complete(value));
            }
            StageOutcome::Failed { reason } => {
                self.run.update(self.stage, |s| s.fail(reason.clone()));
            }
        }
    }

    fn emit(&self, event_type: &str, mut data: serde_json::Value) {
        if let serde_json::Value::Object(ref mut map) = data {
            map.insert("stage".to_string(), serde_json::json!(self.stage.as_str()));
            map.insert(
                "run_id".to_string(),
                serde_json::json!(self.run.run_id().to_string()),
            );
        }
        self.ctx.try_emit_event(event_type, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{InMemorySessionStorage, RunMarker};
    use crate::config::PipelineConfig;
    use crate::context::RunIdentity;
    use crate::core::StageStatus;
    use crate::events::CollectingEventSink;
    use crate::models::ContentPreservation;
    use crate::pipeline::{Adoption, StageGraph};
    use crate::remote::MockEnhancementService;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn context() -> (Arc<CollectingEventSink>, PipelineContext) {
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = PipelineContext::new(
            PipelineConfig::new(),
            Arc::new(InMemorySessionStorage::new()),
            Arc::new(MockEnhancementService::new()),
        )
        .with_event_sink(sink.clone());
        (sink, ctx)
    }

    fn run(adoption: Adoption) -> ActiveRun {
        ActiveRun::new(RunIdentity::new("default"), adoption, &StageGraph::enhancement())
    }

    /// A run that owns the enhancement marker, as after a fresh submission.
    async fn owned_run(ctx: &PipelineContext) -> ActiveRun {
        let run = run(Adoption::OwnRun);
        ctx.store()
            .set_marker(run.scope(), &RunMarker::new(run.run_id()))
            .await
            .unwrap();
        run
    }

    fn preservation(score: f64) -> ContentPreservation {
        ContentPreservation {
            content_preservation_score: score,
        }
    }

    #[tokio::test]
    async fn test_second_execution_is_a_cache_hit() {
        let (sink, ctx) = context();
        let run = owned_run(&ctx).await;
        let executor = StageExecutor::new(&ctx, &run, StageName::ContentPreservation);
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        for _ in 0..2 {
            let outcome = executor
                .execute(move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(preservation(0.8))
                })
                .await;
            assert!(outcome.is_completed());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.count_for_stage("stage.cache_hit", "content_preservation"), 1);
        assert_eq!(
            run.stage(StageName::ContentPreservation).unwrap().status(),
            StageStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_failure_is_checkpointed_and_stable() {
        let (_, ctx) = context();
        let run = owned_run(&ctx).await;
        let executor = StageExecutor::new(&ctx, &run, StageName::AlignmentScore);

        let first: StageOutcome<crate::models::AlignmentScores> = executor
            .execute(|| async { Err(RemoteError::status(500, "Internal Server Error")) })
            .await;
        assert_eq!(first.reason(), Some("HTTP 500: Internal Server Error"));

        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let second: StageOutcome<crate::models::AlignmentScores> = executor
            .execute(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(crate::models::AlignmentScores::new())
            })
            .await;
        assert_eq!(second, first);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let entry = ctx.store().get(StageName::AlignmentScore).await.unwrap().unwrap();
        assert_eq!(entry.status, StageStatus::Failed);
        assert_eq!(entry.run_id, run.run_id());
    }

    #[tokio::test]
    async fn test_invalid_payload_is_a_failure() {
        let (_, ctx) = context();
        let run = owned_run(&ctx).await;
        let executor = StageExecutor::new(&ctx, &run, StageName::ContentPreservation);

        let outcome = executor.execute(|| async { Ok(preservation(3.5)) }).await;
        assert!(outcome.reason().unwrap().starts_with("Invalid response"));
    }

    #[tokio::test]
    async fn test_owned_run_ignores_other_runs_checkpoints() {
        let stale = CheckpointEntry::completed(
            StageName::ContentPreservation,
            serde_json::json!({"content_preservation_score": 0.1}),
            uuid::Uuid::now_v7(),
        );

        let (_, ctx) = context();
        ctx.store().put(&stale).await.unwrap();
        let owned = owned_run(&ctx).await;
        let outcome = StageExecutor::new(&ctx, &owned, StageName::ContentPreservation)
            .execute(|| async { Ok(preservation(0.9)) })
            .await;
        assert_eq!(outcome.result().unwrap().content_preservation_score, 0.9);
        let entry = ctx.store().get(StageName::ContentPreservation).await.unwrap().unwrap();
        assert_eq!(entry.run_id, owned.run_id());

        // Without a marker, a direct-entry run adopts whatever is there.
        let (_, ctx) = context();
        ctx.store().put(&stale).await.unwrap();
        let direct = run(Adoption::AnyRun);
        let adopted = StageExecutor::new(&ctx, &direct, StageName::ContentPreservation)
            .execute(|| async { Ok(preservation(0.2)) })
            .await;
        assert_eq!(adopted.result().unwrap().content_preservation_score, 0.1);
    }

    #[tokio::test]
    async fn test_concurrent_executions_share_one_call() {
        let (sink, ctx) = context();
        let run = owned_run(&ctx).await;
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let (release, gate) = tokio::sync::oneshot::channel::<()>();

        let owner = StageExecutor::new(&ctx, &run, StageName::ImprovementDiff);
        let joiner = StageExecutor::new(&ctx, &run, StageName::ImprovementDiff);

        let first = owner.execute(move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = gate.await;
            Ok(crate::testing::sample_improvements())
        });
        let second = async {
            tokio::task::yield_now().await;
            joiner
                .execute(move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(crate::testing::sample_improvements())
                })
                .await
        };
        let opener = async {
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            let _ = release.send(());
        };

        let (a, b, ()) = tokio::join!(first, second, opener);
        assert_eq!(a, b);
        assert!(a.is_completed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.count_for_stage("stage.joined", "improvement_diff"), 1);
        assert!(!ctx.tracker().any_in_flight());
    }

    #[tokio::test]
    async fn test_fail_unavailable_records_reason() {
        let (_, ctx) = context();
        let run = run(Adoption::AnyRun);
        let outcome: StageOutcome<crate::models::AlignmentScores> =
            StageExecutor::new(&ctx, &run, StageName::AlignmentScore)
                .fail_unavailable()
                .await;
        assert_eq!(outcome.reason(), Some(DEPENDENCY_UNAVAILABLE));
        assert!(ctx.store().get(StageName::AlignmentScore).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_superseded_run_neither_calls_nor_writes() {
        let (_, ctx) = context();
        let run = owned_run(&ctx).await;
        run.supersede();
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let outcome = StageExecutor::new(&ctx, &run, StageName::ContentPreservation)
            .execute(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(preservation(0.5))
            })
            .await;

        assert_eq!(outcome.reason(), Some(RUN_SUPERSEDED));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(ctx
            .store()
            .get(StageName::ContentPreservation)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_marker_of_another_run_stops_dispatch() {
        let (_, ctx) = context();
        let run = owned_run(&ctx).await;
        ctx.store()
            .set_marker(run.scope(), &RunMarker::new(uuid::Uuid::now_v7()))
            .await
            .unwrap();
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let outcome = StageExecutor::new(&ctx, &run, StageName::AlignmentScore)
            .execute(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(crate::models::AlignmentScores::new())
            })
            .await;

        assert_eq!(outcome.reason(), Some(RUN_SUPERSEDED));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(run.is_superseded());
        assert!(!ctx.tracker().any_in_flight());
    }

    #[tokio::test]
    async fn test_result_is_dropped_when_run_is_replaced_mid_call() {
        let (_, ctx) = context();
        let run = owned_run(&ctx).await;
        let newer = RunMarker::new(uuid::Uuid::now_v7());
        let store = ctx.store().clone();
        let scope = run.scope().clone();

        let outcome = StageExecutor::new(&ctx, &run, StageName::ContentPreservation)
            .execute(move || async move {
                store.set_marker(&scope, &newer).await.unwrap();
                Ok(preservation(0.5))
            })
            .await;

        // The call itself finished, but the newer run owns the store now.
        assert!(outcome.is_completed());
        assert!(run.is_superseded());
        assert!(ctx
            .store()
            .get(StageName::ContentPreservation)
            .await
            .unwrap()
            .is_none());
    }
}
