//! The in-memory state of one pipeline run.

use super::StageGraph;
use crate::checkpoint::RunScope;
use crate::context::RunIdentity;
use crate::core::{Stage, StageName, StageStatus};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// Which checkpoints a run may adopt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adoption {
    /// Only entries the run wrote itself. Used by every run that owns its
    /// scope's marker: fresh submissions and runs resumed from a marker.
    OwnRun,
    /// Entries written by any run. Used on direct entry, when no marker
    /// names an owner.
    AnyRun,
}

/// One execution of a stage graph for one submitted job.
#[derive(Debug)]
pub struct ActiveRun {
    identity: RunIdentity,
    adoption: Adoption,
    scope: RunScope,
    stages: Mutex<BTreeMap<StageName, Stage>>,
    superseded: AtomicBool,
}

impl ActiveRun {
    /// Creates a run with every stage `NotStarted`.
    #[must_use]
    pub fn new(identity: RunIdentity, adoption: Adoption, graph: &StageGraph) -> Self {
        Self {
            identity,
            adoption,
            scope: graph.scope().clone(),
            stages: Mutex::new(graph.stage_records()),
            superseded: AtomicBool::new(false),
        }
    }

    /// Returns the run identity.
    #[must_use]
    pub fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    /// Returns the run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.identity.run_id
    }

    /// Returns the run's adoption policy.
    #[must_use]
    pub fn adoption(&self) -> Adoption {
        self.adoption
    }

    /// The checkpoints and marker this run owns.
    #[must_use]
    pub fn scope(&self) -> &RunScope {
        &self.scope
    }

    /// Returns true if a checkpoint written by `writer` may be adopted.
    #[must_use]
    pub fn accepts_checkpoint_from(&self, writer: Uuid) -> bool {
        match self.adoption {
            Adoption::OwnRun => writer == self.identity.run_id,
            Adoption::AnyRun => true,
        }
    }

    /// Returns true if `owner`, the run named by the scope's marker, leaves
    /// this run in charge. Without a marker only a direct-entry run is.
    #[must_use]
    pub fn is_owner(&self, owner: Option<Uuid>) -> bool {
        match owner {
            Some(owner) => owner == self.identity.run_id,
            None => self.adoption == Adoption::AnyRun,
        }
    }

    /// Marks the run as replaced by a newer one. A superseded run neither
    /// dispatches calls nor writes checkpoints.
    pub fn supersede(&self) {
        self.superseded.store(true, Ordering::SeqCst);
    }

    /// Returns true if a newer run replaced this one.
    #[must_use]
    pub fn is_superseded(&self) -> bool {
        self.superseded.load(Ordering::SeqCst)
    }

    /// Returns a copy of one stage record.
    #[must_use]
    pub fn stage(&self, name: StageName) -> Option<Stage> {
        self.stages.lock().get(&name).cloned()
    }

    /// Returns copies of all stage records in graph order.
    #[must_use]
    pub fn stages(&self) -> Vec<Stage> {
        self.stages.lock().values().cloned().collect()
    }

    /// Returns the status of every stage.
    #[must_use]
    pub fn statuses(&self) -> BTreeMap<StageName, StageStatus> {
        self.stages
            .lock()
            .iter()
            .map(|(name, stage)| (*name, stage.status()))
            .collect()
    }

    /// Applies a transition to a stage record.
    pub fn update(&self, name: StageName, transition: impl FnOnce(&mut Stage)) {
        if let Some(stage) = self.stages.lock().get_mut(&name) {
            transition(stage);
        }
    }

    /// Returns true once every stage is terminal.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.stages.lock().values().all(|s| s.status().is_terminal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_bound_run_only_accepts_own_checkpoints() {
        let graph = StageGraph::enhancement();
        let owned = ActiveRun::new(RunIdentity::new("s"), Adoption::OwnRun, &graph);
        assert!(owned.accepts_checkpoint_from(owned.run_id()));
        assert!(!owned.accepts_checkpoint_from(Uuid::now_v7()));

        let direct = ActiveRun::new(RunIdentity::new("s"), Adoption::AnyRun, &graph);
        assert!(direct.accepts_checkpoint_from(Uuid::now_v7()));
        assert_eq!(direct.scope(), &RunScope::enhancement());
    }

    #[test]
    fn test_ownership_follows_marker() {
        let graph = StageGraph::enhancement();
        let owned = ActiveRun::new(RunIdentity::new("s"), Adoption::OwnRun, &graph);
        assert!(owned.is_owner(Some(owned.run_id())));
        assert!(!owned.is_owner(Some(Uuid::now_v7())));
        assert!(!owned.is_owner(None));

        let direct = ActiveRun::new(RunIdentity::new("s"), Adoption::AnyRun, &graph);
        assert!(direct.is_owner(None));
        assert!(!direct.is_owner(Some(Uuid::now_v7())));
    }

    #[test]
    fn test_update_and_settled() {
        let run = ActiveRun::new(RunIdentity::new("s"), Adoption::OwnRun, &StageGraph::analysis());
        assert!(!run.is_settled());
        run.update(StageName::Evaluate, |s| s.fail("HTTP 500: x"));
        assert!(run.is_settled());
        assert_eq!(run.statuses()[&StageName::Evaluate], StageStatus::Failed);

        run.supersede();
        assert!(run.is_superseded());
    }
}
