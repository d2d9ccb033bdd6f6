//! Core domain model types for resumeflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Stage names, statuses and executor states
//! - The per-run stage record
//! - The settled stage outcome

mod output;
mod stage;
mod status;

pub use output::StageOutcome;
pub use stage::Stage;
pub use status::{ExecutorState, StageName, StageStatus};
