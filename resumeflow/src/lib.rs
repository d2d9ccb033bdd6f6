//! # Resumeflow
//!
//! Checkpointed, restart-safe orchestration of the resume enhancement
//! pipeline.
//!
//! A submitted job runs through four remote stages:
//!
//! - **Generate** renders the enhanced resume
//! - **AlignmentScore** scores it against the job
//! - **ContentPreservation** and **ImprovementDiff** compare it with the
//!   original as a settle-all pair
//!
//! Every settled stage is written to a session-scoped checkpoint store, so a
//! restarted process resumes where the previous one stopped without repeating
//! a completed remote call. Concurrent requests for the same stage share one
//! call, and a failed stage never takes its siblings down with it.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use resumeflow::prelude::*;
//!
//! let config = PipelineConfig::from_env()?;
//! let ctx = Arc::new(PipelineContext::from_config(config).await?);
//! let controller = PipelineController::new(ctx.clone());
//!
//! // First visit: submit the job.
//! let report = controller.submit(&submission).await?;
//!
//! // After a reload: pick up whatever is missing.
//! let report = controller.resume().await?;
//! let view = EnhancementReport::from_run(&report, ctx.config().fallback_score_percent);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod checkpoint;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod remote;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::checkpoint::{
        CheckpointStore, FileSessionStorage, InMemorySessionStorage, SessionStorage,
    };
    pub use crate::config::{HttpConfig, PipelineConfig};
    pub use crate::context::{PipelineContext, RunIdentity};
    pub use crate::core::{ExecutorState, Stage, StageName, StageOutcome, StageStatus};
    pub use crate::errors::{CheckpointError, ConfigError, ResumeflowError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::models::{
        AlignmentScores, ContentPreservation, EvaluationRequest, EvaluationResult,
        GeneratedResume, ImprovementAnalysis, ResumeArtifact, Submission, SupplementalAnswer,
    };
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{
        AnalysisPipeline, DisplayScore, EnhancementReport, ExitDecision, InterruptionGuard,
        NavigationIntent, PipelineController, RunReport, StartMode,
    };
    #[cfg(feature = "http")]
    pub use crate::remote::HttpEnhancementService;
    pub use crate::remote::{EnhancementService, RemoteError};
    pub use std::sync::Arc;
}
