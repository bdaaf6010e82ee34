//! Drag-session state machine for moving cards between stage columns
//!
//! `Idle -> Pressed -> Dragging -> Resolving -> Idle`. The session turns raw
//! pointer input into `DragEvent`s and emits one `TransitionRequest` per
//! accepted drop; everything after the drop belongs to the coordinator.

mod session;
mod types;


pub use session::DragSession;
pub use types::{
    DragError, DragEvent, DragOrigin, DragPhase, DragSessionState, DropTarget, Point,
};
