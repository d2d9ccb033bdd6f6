//! Testing utilities for resumeflow pipelines.
//!
//! This module provides:
//! - A scripted remote service with call counting, failures, latency and gates
//! - Sample submissions and stage payloads

mod fixtures;
mod mocks;

pub use fixtures::{
    sample_alignment, sample_evaluation, sample_evaluation_request, sample_generated,
    sample_improvements, sample_preservation, sample_submission, SAMPLE_PDF,
};
pub use mocks::ScriptedService;
