//! Transition orchestration
//!
//! A request passes the stage graph (legality), then the validator
//! (completeness), and only then reaches the store and the persistence
//! gateway. Incomplete forward moves and Won/Lost moves pause and hand back a
//! `GapFill` or `TerminalCapture` for the caller to complete or cancel.

mod core;
pub mod retry;
mod types;

#[cfg(test)]
mod tests;

pub use self::core::TransitionCoordinator;
pub use retry::CommitPolicy;
pub use types::{
    GapFill, TerminalCapture, TransitionError, TransitionEvent, TransitionOutcome, TransitionPhase,
};
