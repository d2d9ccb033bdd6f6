//! Pipeline orchestration.
//!
//! This module provides:
//! - The fixed stage graphs
//! - The call tracker suppressing duplicate remote calls
//! - The stage executor state machine
//! - The enhancement controller and the analysis pipeline
//! - Start classification, progress, the interruption guard and display scores

mod analysis;
mod controller;
mod executor;
mod graph;
mod guard;
mod progress;
pub mod recovery;
mod report;
mod run;
pub mod scoring;
mod tracker;


pub use analysis::AnalysisPipeline;
pub use controller::{PipelineController, RunReport};
pub use executor::{StageExecutor, DEPENDENCY_UNAVAILABLE, RUN_SUPERSEDED};
pub use graph::StageGraph;
pub use guard::{ExitDecision, InterruptionGuard};
pub use progress::{enhancement_progress, ProgressTracker, GENERATE_SETTLED, POST_GENERATION_STEP};
pub use recovery::{classify_start, NavigationIntent, StartMode};
pub use report::{EnhancementReport, StageView};
pub use run::{ActiveRun, Adoption};
pub use scoring::DisplayScore;
pub use tracker::{CallPermit, CallState, CallTracker, CallWaiter, Dispatch};
