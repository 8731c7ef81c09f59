//! Run polling state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions:
//! the executor feeds observations in as events and performs the effects
//! that come back out.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use state::{RunContext, RunFault, RunState};
pub use transition::{retry_delay, transition, TransitionError, TransitionResult};
