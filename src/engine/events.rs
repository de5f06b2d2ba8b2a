//! Observer bus.
//!
//! The latest `BettingState` is published on a watch channel; everything
//! else that happens in the loop goes out, in order, on a broadcast channel.
//! Observers only ever receive copies.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::types::{BetOutcome, BettingState, DiceReading, WagerInstruction};

/// Backlog kept for slow subscribers before they start lagging.
const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoopEvent {
    Started,
    Stopped { reason: StopReason },
    TickSkipped,
    CaptureFailed { reason: String },
    RecognitionFailed { reason: String },
    Reading { reading: DiceReading },
    Outcome { outcome: BetOutcome, at: DateTime<Utc> },
    WagerPlaced { instruction: WagerInstruction },
    ActuationFailed { instruction: WagerInstruction, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Requested,
    LossCapReached,
    Shutdown,
}

/// Sending half, owned by the coordinator.
#[derive(Debug, Clone)]
pub struct EventBus {
    state: watch::Sender<BettingState>,
    events: broadcast::Sender<LoopEvent>,
}

impl EventBus {
    pub fn new(initial: BettingState) -> Self {
        let (state, _) = watch::channel(initial);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { state, events }
    }

    pub fn publish_state(&self, snapshot: BettingState) {
        self.state.send_replace(snapshot);
    }

    /// Deliver an event. Having no subscribers is fine.
    pub fn emit(&self, event: LoopEvent) {
        let _ = self.events.send(event);
    }

    pub fn snapshot(&self) -> BettingState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<BettingState> {
        self.state.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoopEvent> {
        self.events.subscribe()
    }
}
