//! Domain events emitted by the pipelines.
//!
//! Every state transition a stage executor or controller makes is reported
//! twice: as a `tracing` record and as an event pushed to the injected
//! [`EventSink`]. Event names are collected in [`types`].

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names.
pub mod types {
    /// A stage's remote call was issued.
    pub const STAGE_DISPATCHED: &str = "stage.dispatched";
    /// A stage was served from its checkpoint.
    pub const STAGE_CACHE_HIT: &str = "stage.cache_hit";
    /// A stage joined a call already in flight.
    pub const STAGE_JOINED: &str = "stage.joined";
    /// A stage completed.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A stage failed.
    pub const STAGE_FAILED: &str = "stage.failed";
    /// The start of a run was classified.
    pub const RUN_CLASSIFIED: &str = "run.classified";
    /// Prior checkpoints were invalidated by a fresh submission.
    pub const RUN_INVALIDATED: &str = "run.invalidated";
    /// A run settled every stage.
    pub const RUN_FINISHED: &str = "run.finished";
    /// Progress advanced.
    pub const PIPELINE_PROGRESS: &str = "pipeline.progress";
}
