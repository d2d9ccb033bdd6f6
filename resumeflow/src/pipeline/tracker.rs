//! In-process duplicate-call suppression.
//!
//! The tracker remembers, per stage, whether a remote call is outstanding in
//! this process. A second executor for the same stage joins the outstanding
//! call through a `watch` channel instead of dispatching again. Nothing here
//! survives a restart; the checkpoint store is authoritative across restarts.

use crate::core::{StageName, StageOutcome};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// Tracker state of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// A remote call is outstanding.
    Calling,
    /// The last call settled.
    Completed,
}

#[derive(Debug, Clone)]
enum Settlement {
    Pending,
    Settled(StageOutcome<serde_json::Value>),
    Abandoned,
}

#[derive(Debug)]
struct Slot {
    state: CallState,
    generation: u64,
    settlement: watch::Sender<Settlement>,
}

/// Result of trying to claim a stage for dispatch.
#[derive(Debug)]
pub enum Dispatch<'a> {
    /// The caller owns the call and must settle the permit.
    Acquired(CallPermit<'a>),
    /// Another caller owns the call; wait on it.
    InFlight(CallWaiter),
}

/// Exclusive right to issue a stage's remote call.
///
/// Dropping the permit without settling it (for example because the owning
/// future was cancelled) releases the slot and wakes joiners so one of them
/// can dispatch instead.
#[derive(Debug)]
pub struct CallPermit<'a> {
    tracker: &'a CallTracker,
    stage: StageName,
    generation: u64,
    settled: bool,
}

impl CallPermit<'_> {
    /// The stage this permit is for.
    #[must_use]
    pub fn stage(&self) -> StageName {
        self.stage
    }

    /// Marks the call completed and publishes its outcome to joiners.
    pub fn settle(mut self, outcome: StageOutcome<serde_json::Value>) {
        self.settled = true;
        self.tracker
            .release(self.stage, self.generation, Some(outcome));
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.tracker.release(self.stage, self.generation, None);
        }
    }
}

/// Handle on a call owned by someone else.
#[derive(Debug)]
pub struct CallWaiter {
    settlement: watch::Receiver<Settlement>,
}

impl CallWaiter {
    /// Waits for the owning call to settle.
    ///
    /// Returns `None` if the owner gave up or the slot was reset; the caller
    /// should then try to claim the stage again.
    pub async fn wait(mut self) -> Option<StageOutcome<serde_json::Value>> {
        let settled = self
            .settlement
            .wait_for(|s| !matches!(s, Settlement::Pending))
            .await
            .ok()?;
        match &*settled {
            Settlement::Settled(outcome) => Some(outcome.clone()),
            Settlement::Pending | Settlement::Abandoned => None,
        }
    }
}

/// Per-process map from stage to call state.
#[derive(Debug, Default)]
pub struct CallTracker {
    slots: Mutex<HashMap<StageName, Slot>>,
    next_generation: AtomicU64,
}

impl CallTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims a stage for dispatch, or returns a waiter on the call already
    /// outstanding for it.
    pub fn begin(&self, stage: StageName) -> Dispatch<'_> {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(&stage) {
            if slot.state == CallState::Calling {
                return Dispatch::InFlight(CallWaiter {
                    settlement: slot.settlement.subscribe(),
                });
            }
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (settlement, _) = watch::channel(Settlement::Pending);
        slots.insert(
            stage,
            Slot {
                state: CallState::Calling,
                generation,
                settlement,
            },
        );
        Dispatch::Acquired(CallPermit {
            tracker: self,
            stage,
            generation,
            settled: false,
        })
    }

    fn release(
        &self,
        stage: StageName,
        generation: u64,
        outcome: Option<StageOutcome<serde_json::Value>>,
    ) {
        let mut slots = self.slots.lock();
        // A reset may have replaced the slot; a stale permit must not touch
        // the new one.
        if slots.get(&stage).map(|s| s.generation) != Some(generation) {
            return;
        }
        match outcome {
            Some(outcome) => {
                if let Some(slot) = slots.get_mut(&stage) {
                    slot.state = CallState::Completed;
                    slot.settlement.send_replace(Settlement::Settled(outcome));
                }
            }
            None => {
                if let Some(slot) = slots.remove(&stage) {
                    slot.settlement.send_replace(Settlement::Abandoned);
                }
            }
        }
    }

    /// Returns the state of a stage, if it was ever claimed.
    #[must_use]
    pub fn state(&self, stage: StageName) -> Option<CallState> {
        self.slots.lock().get(&stage).map(|s| s.state)
    }

    /// Returns true if the stage has a call outstanding.
    #[must_use]
    pub fn is_in_flight(&self, stage: StageName) -> bool {
        self.state(stage) == Some(CallState::Calling)
    }

    /// Returns true if any stage has a call outstanding.
    #[must_use]
    pub fn any_in_flight(&self) -> bool {
        self.slots
            .lock()
            .values()
            .any(|s| s.state == CallState::Calling)
    }

    /// Returns the stages with a call outstanding, in graph order.
    #[must_use]
    pub fn in_flight(&self) -> Vec<StageName> {
        let mut stages: Vec<StageName> = self
            .slots
            .lock()
            .iter()
            .filter(|(_, s)| s.state == CallState::Calling)
            .map(|(name, _)| *name)
            .collect();
        stages.sort();
        stages
    }

    /// Forgets the given stages. Outstanding permits for them become stale and
    /// their joiners are woken with nothing.
    pub fn reset(&self, stages: &[StageName]) {
        let mut slots = self.slots.lock();
        for stage in stages {
            slots.remove(stage);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acquire(tracker: &CallTracker, stage: StageName) -> CallPermit<'_> {
        match tracker.begin(stage) {
            Dispatch::Acquired(permit) => permit,
            Dispatch::InFlight(_) => panic!("expected to acquire {stage}"),
        }
    }

    fn join(tracker: &CallTracker, stage: StageName) -> CallWaiter {
        match tracker.begin(stage) {
            Dispatch::InFlight(waiter) => waiter,
            Dispatch::Acquired(_) => panic!("expected {stage} to be in flight"),
        }
    }

    #[tokio::test]
    async fn test_second_begin_joins_and_receives_outcome() {
        let tracker = CallTracker::new();
        let permit = acquire(&tracker, StageName::Generate);
        let waiter = join(&tracker, StageName::Generate);

        assert!(tracker.any_in_flight());
        assert_eq!(tracker.in_flight(), vec![StageName::Generate]);

        permit.settle(StageOutcome::completed(serde_json::json!({"ok": true})));
        let outcome = waiter.wait().await.unwrap();
        assert!(outcome.is_completed());
        assert_eq!(tracker.state(StageName::Generate), Some(CallState::Completed));
        assert!(!tracker.any_in_flight());
    }

    #[tokio::test]
    async fn test_completed_stage_can_be_claimed_again() {
        let tracker = CallTracker::new();
        acquire(&tracker, StageName::Evaluate).settle(StageOutcome::failed("HTTP 500: x"));
        let _permit = acquire(&tracker, StageName::Evaluate);
        assert!(tracker.is_in_flight(StageName::Evaluate));
    }

    #[tokio::test]
    async fn test_dropped_permit_releases_slot() {
        let tracker = CallTracker::new();
        let permit = acquire(&tracker, StageName::ImprovementDiff);
        let waiter = join(&tracker, StageName::ImprovementDiff);

        drop(permit);
        assert!(waiter.wait().await.is_none());
        assert_eq!(tracker.state(StageName::ImprovementDiff), None);
        let _again = acquire(&tracker, StageName::ImprovementDiff);
    }

    #[tokio::test]
    async fn test_reset_makes_old_permit_stale() {
        let tracker = CallTracker::new();
        let old = acquire(&tracker, StageName::Generate);
        let waiter = join(&tracker, StageName::Generate);

        tracker.reset(&[StageName::Generate]);
        assert!(waiter.wait().await.is_none());

        let fresh = acquire(&tracker, StageName::Generate);
        old.settle(StageOutcome::failed("superseded"));
        assert!(tracker.is_in_flight(StageName::Generate));
        drop(fresh);
    }
}
