//! Control loop: the capture coordinator, the wager executor and the
//! observer bus they publish on.

pub mod coordinator;
pub mod events;
pub mod executor;

pub use coordinator::{Coordinator, CoordinatorHandle, CycleOutcome};
pub use events::{EventBus, LoopEvent, StopReason};
pub use executor::{ActionSequencer, CancelFlag, SequencerConfig};
