//! Monotonic run progress.

use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::watch;

/// Progress after `Generate` settles.
pub const GENERATE_SETTLED: u8 = 40;

/// Progress added by each settled post-generation stage.
pub const POST_GENERATION_STEP: u8 = 20;

/// Progress value for a run in which `settled_after_generate` of the three
/// post-generation stages have settled.
#[must_use]
pub fn enhancement_progress(settled_after_generate: u8) -> u8 {
    GENERATE_SETTLED
        .saturating_add(POST_GENERATION_STEP.saturating_mul(settled_after_generate.min(3)))
        .min(100)
}

/// A 0..=100 progress value that never decreases within a run.
///
/// Observers can subscribe to updates; a lower report is ignored.
#[derive(Debug)]
pub struct ProgressTracker {
    value: AtomicU8,
    updates: watch::Sender<u8>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        let (updates, _) = watch::channel(0);
        Self {
            value: AtomicU8::new(0),
            updates,
        }
    }
}

impl ProgressTracker {
    /// Creates a tracker at 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current value.
    #[must_use]
    pub fn get(&self) -> u8 {
        self.value.load(Ordering::SeqCst)
    }

    /// Reports a value. Returns the value now in effect, which is the
    /// larger of the report and the previous value.
    pub fn report(&self, percent: u8) -> u8 {
        let percent = percent.min(100);
        let previous = self.value.fetch_max(percent, Ordering::SeqCst);
        let current = previous.max(percent);
        if current != previous {
            self.updates.send_replace(current);
        }
        current
    }

    /// Returns to 0. Only called when a new run starts.
    pub(crate) fn reset(&self) {
        self.value.store(0, Ordering::SeqCst);
        self.updates.send_replace(0);
    }

    /// Subscribes to progress changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u8> {
        self.updates.subscribe()
    }
}
