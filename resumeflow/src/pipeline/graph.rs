//! The fixed stage graphs.

use crate::checkpoint::RunScope;
use crate::core::{Stage, StageName};
use std::collections::BTreeMap;

/// A fixed dependency graph. Only the two graphs below exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageGraph {
    edges: Vec<(StageName, Vec<StageName>)>,
    scope: RunScope,
}

impl StageGraph {
    /// The enhancement graph:
    ///
    /// ```text
    /// Generate
    /// AlignmentScore       <- Generate
    /// ContentPreservation  <- Generate
    /// ImprovementDiff      <- Generate
    /// ```
    #[must_use]
    pub fn enhancement() -> Self {
        Self {
            edges: vec![
                (StageName::Generate, Vec::new()),
                (StageName::AlignmentScore, vec![StageName::Generate]),
                (StageName::ContentPreservation, vec![StageName::Generate]),
                (StageName::ImprovementDiff, vec![StageName::Generate]),
            ],
            scope: RunScope::enhancement(),
        }
    }

    /// The single-stage analysis graph.
    #[must_use]
    pub fn analysis() -> Self {
        Self {
            edges: vec![(StageName::Evaluate, Vec::new())],
            scope: RunScope::analysis(),
        }
    }

    /// Stages in execution order. Every stage follows its dependencies.
    pub fn stages(&self) -> impl Iterator<Item = StageName> + '_ {
        self.edges.iter().map(|(name, _)| *name)
    }

    /// Dependencies of a stage; empty for unknown stages.
    #[must_use]
    pub fn dependencies(&self, stage: StageName) -> &[StageName] {
        self.edges
            .iter()
            .find(|(name, _)| *name == stage)
            .map(|(_, deps)| deps.as_slice())
            .unwrap_or(&[])
    }

    /// The checkpoints and marker a run of this graph owns.
    #[must_use]
    pub fn scope(&self) -> &RunScope {
        &self.scope
    }

    /// Fresh `NotStarted` records for every stage.
    #[must_use]
    pub fn stage_records(&self) -> BTreeMap<StageName, Stage> {
        self.edges
            .iter()
            .map(|(name, deps)| (*name, Stage::new(*name, deps.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enhancement_graph_shape() {
        let graph = StageGraph::enhancement();
        let order: Vec<_> = graph.stages().collect();
        assert_eq!(order, StageName::ENHANCEMENT.to_vec());

        assert!(graph.dependencies(StageName::Generate).is_empty());
        for stage in &order[1..] {
            assert_eq!(graph.dependencies(*stage), &[StageName::Generate]);
        }
        assert_eq!(graph.scope(), &RunScope::enhancement());
    }

    #[test]
    fn test_order_respects_dependencies() {
        let graph = StageGraph::enhancement();
        let order: Vec<_> = graph.stages().collect();
        for (index, stage) in order.iter().enumerate() {
            for dep in graph.dependencies(*stage) {
                let dep_index = order.iter().position(|s| s == dep).unwrap();
                assert!(dep_index < index, "{dep} must precede {stage}");
            }
        }
    }

    #[test]
    fn test_analysis_graph_and_records() {
        let graph = StageGraph::analysis();
        let records = graph.stage_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[&StageName::Evaluate].depends_on, Vec::new());
        assert!(graph.dependencies(StageName::Generate).is_empty());
        assert_eq!(graph.scope().stages(), &[StageName::Evaluate]);
    }
}
