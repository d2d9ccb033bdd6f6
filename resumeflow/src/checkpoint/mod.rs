//! Durable, session-scoped checkpoints.
//!
//! The store holds one entry per stage plus the submitted job and the
//! `processed` marker used by start classification. Everything lives under
//! keys prefixed by the session id.

mod storage;
mod store;

pub use storage::{FileSessionStorage, InMemorySessionStorage, SessionStorage};
pub use store::{CheckpointEntry, CheckpointStore, RunMarker, RunScope, StoredOutcome};

use crate::config::PipelineConfig;
use crate::errors::CheckpointError;
use std::sync::Arc;

/// Opens the storage a configuration asks for: file-backed when
/// `storage_path` is set, in-memory otherwise.
pub async fn open_storage(
    config: &PipelineConfig,
) -> Result<Arc<dyn SessionStorage>, CheckpointError> {
    match &config.storage_path {
        Some(path) => Ok(Arc::new(FileSessionStorage::open(path).await?)),
        None => Ok(Arc::new(InMemorySessionStorage::new())),
    }
}
