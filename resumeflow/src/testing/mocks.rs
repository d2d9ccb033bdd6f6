//! A scripted [`EnhancementService`] for pipeline tests.

use super::fixtures::{
    sample_alignment, sample_evaluation, sample_generated, sample_improvements,
    sample_preservation,
};
use crate::core::StageName;
use crate::models::{
    AlignmentRequest, AlignmentScores, ComparisonRequest, ContentPreservation, EvaluationRequest,
    EvaluationResult, GenerateRequest, GeneratedResume, ImprovementAnalysis,
};
use crate::remote::{EnhancementService, RemoteError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// A service that answers every operation from canned payloads and records
/// how it was called.
///
/// Per stage it can be scripted to fail, to take a fixed time, or to block
/// behind a gate until the test opens it. `Generate` can answer each call
/// with a different payload.
#[derive(Debug)]
pub struct ScriptedService {
    generated: Vec<GeneratedResume>,
    alignment: AlignmentScores,
    preservation: ContentPreservation,
    improvements: ImprovementAnalysis,
    evaluation: EvaluationResult,
    failures: HashMap<StageName, RemoteError>,
    latency: HashMap<StageName, Duration>,
    /// Gate and the number of leading calls it holds.
    gates: HashMap<StageName, (watch::Sender<bool>, usize)>,
    calls: watch::Sender<BTreeMap<StageName, usize>>,
    order: Mutex<Vec<StageName>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl Default for ScriptedService {
    fn default() -> Self {
        let (calls, _) = watch::channel(BTreeMap::new());
        Self {
            generated: vec![sample_generated()],
            alignment: sample_alignment(),
            preservation: sample_preservation(),
            improvements: sample_improvements(),
            evaluation: sample_evaluation(),
            failures: HashMap::new(),
            latency: HashMap::new(),
            gates: HashMap::new(),
            calls,
            order: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }
}

impl ScriptedService {
    /// Creates a service that succeeds with the sample payloads.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call for `stage` fail with `error`.
    #[must_use]
    pub fn with_failure(mut self, stage: StageName, error: RemoteError) -> Self {
        self.failures.insert(stage, error);
        self
    }

    /// Delays every call for `stage`.
    #[must_use]
    pub fn with_latency(mut self, stage: StageName, latency: Duration) -> Self {
        self.latency.insert(stage, latency);
        self
    }

    /// Blocks calls for `stage` until [`Self::open_gate`] is called.
    #[must_use]
    pub fn with_gate(self, stage: StageName) -> Self {
        self.gated(stage, usize::MAX)
    }

    /// Blocks only the first call for `stage`; later calls pass straight
    /// through.
    #[must_use]
    pub fn with_gate_on_first_call(self, stage: StageName) -> Self {
        self.gated(stage, 1)
    }

    fn gated(mut self, stage: StageName, calls: usize) -> Self {
        let (gate, _) = watch::channel(false);
        self.gates.insert(stage, (gate, calls));
        self
    }

    /// Sets the `Generate` response for every call.
    #[must_use]
    pub fn with_generated(mut self, generated: GeneratedResume) -> Self {
        self.generated = vec![generated];
        self
    }

    /// Answers the next `Generate` call not yet scripted with `generated`.
    /// The last scripted response repeats once the script runs out.
    #[must_use]
    pub fn then_generated(mut self, generated: GeneratedResume) -> Self {
        self.generated.push(generated);
        self
    }

    /// Sets the `ContentPreservation` response ratio.
    #[must_use]
    pub fn with_preservation(mut self, score: f64) -> Self {
        self.preservation = ContentPreservation {
            content_preservation_score: score,
        };
        self
    }

    /// Sets the `AlignmentScore` response.
    #[must_use]
    pub fn with_alignment(mut self, alignment: AlignmentScores) -> Self {
        self.alignment = alignment;
        self
    }

    /// Releases calls blocked on `stage`'s gate.
    pub fn open_gate(&self, stage: StageName) {
        if let Some((gate, _)) = self.gates.get(&stage) {
            gate.send_replace(true);
        }
    }

    /// Number of calls made for `stage`.
    #[must_use]
    pub fn calls(&self, stage: StageName) -> usize {
        self.calls.borrow().get(&stage).copied().unwrap_or(0)
    }

    /// Number of calls made across all stages.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls.borrow().values().sum()
    }

    /// Stages in the order their calls started.
    #[must_use]
    pub fn call_order(&self) -> Vec<StageName> {
        self.order.lock().clone()
    }

    /// Highest number of calls that were outstanding at the same time.
    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Waits until at least `count` calls for `stage` have started.
    pub async fn wait_for_calls(&self, stage: StageName, count: usize) {
        let mut calls = self.calls.subscribe();
        let _ = calls
            .wait_for(|calls| calls.get(&stage).copied().unwrap_or(0) >= count)
            .await;
    }

    /// Answers call number `n` for `stage` with `payloads[n]`, or the last
    /// payload once the script runs out.
    async fn respond<T>(&self, stage: StageName, payloads: &[T]) -> Result<T, RemoteError>
    where
        T: Clone,
    {
        self.order.lock().push(stage);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        let mut index = 0;
        self.calls.send_modify(|calls| {
            let count = calls.entry(stage).or_default();
            index = *count;
            *count += 1;
        });

        if let Some(latency) = self.latency.get(&stage) {
            tokio::time::sleep(*latency).await;
        }
        if let Some((gate, held)) = self.gates.get(&stage) {
            if index < *held {
                let mut open = gate.subscribe();
                let _ = open.wait_for(|open| *open).await;
            }
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if let Some(error) = self.failures.get(&stage) {
            return Err(error.clone());
        }
        payloads
            .get(index)
            .or_else(|| payloads.last())
            .cloned()
            .ok_or_else(|| RemoteError::InvalidResponse(format!("no scripted {stage} payload")))
    }
}

#[async_trait]
impl EnhancementService for ScriptedService {
    async fn generate(&self, _request: &GenerateRequest) -> Result<GeneratedResume, RemoteError> {
        self.respond(StageName::Generate, &self.generated).await
    }

    async fn alignment_score(
        &self,
        _request: &AlignmentRequest,
    ) -> Result<AlignmentScores, RemoteError> {
        self.respond(StageName::AlignmentScore, std::slice::from_ref(&self.alignment))
            .await
    }

    async fn content_preservation(
        &self,
        _request: &ComparisonRequest,
    ) -> Result<ContentPreservation, RemoteError> {
        self.respond(StageName::ContentPreservation, std::slice::from_ref(&self.preservation))
            .await
    }

    async fn improvement_diff(
        &self,
        _request: &ComparisonRequest,
    ) -> Result<ImprovementAnalysis, RemoteError> {
        self.respond(StageName::ImprovementDiff, std::slice::from_ref(&self.improvements))
            .await
    }

    async fn evaluate(&self, _request: &EvaluationRequest) -> Result<EvaluationResult, RemoteError> {
        self.respond(StageName::Evaluate, std::slice::from_ref(&self.evaluation))
            .await
    }
}
