use crate::graph::IllegalMove;
use crate::models::{OpportunityId, StageId, TransitionRequest};

/// Pointer position in board coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// A slot on the board: a stage column and an insertion index within it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropTarget {
    pub stage_id: StageId,
    pub index: usize,
}

impl DropTarget {
    pub fn new(stage_id: StageId, index: usize) -> Self {
        Self { stage_id, index }
    }
}

/// Card picked up by a pointer-down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragOrigin {
    pub opportunity_id: OpportunityId,
    pub stage_id: StageId,
    pub index: usize,
}

impl DragOrigin {
    pub fn target(&self) -> DropTarget {
        DropTarget::new(self.stage_id.clone(), self.index)
    }
}

/// Ephemeral state of a live drag, from activation to drop or cancel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragSessionState {
    pub active_opportunity_id: OpportunityId,
    pub origin_stage_id: StageId,
    pub current_candidate_stage_id: StageId,
    pub current_candidate_index_within_stage: usize,
}

/// Lifecycle phase of the drag session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragPhase {
    Idle,
    /// Pointer is down but has not travelled past the activation distance.
    Pressed,
    Dragging,
    /// A drop produced a transition request that is still being handled.
    Resolving,
}

impl std::fmt::Display for DragPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DragPhase::Idle => write!(f, "Idle"),
            DragPhase::Pressed => write!(f, "Pressed"),
            DragPhase::Dragging => write!(f, "Dragging"),
            DragPhase::Resolving => write!(f, "Resolving"),
        }
    }
}

/// Signals emitted by the drag session for the board to render.
#[derive(Debug, Clone, PartialEq)]
pub enum DragEvent {
    Started(DragSessionState),
    CandidateChanged(DropTarget),
    /// Hovered target refused; the previous candidate stays in place.
    CandidateRejected {
        target: DropTarget,
        reason: IllegalMove,
    },
    Dropped(TransitionRequest),
    /// Released inside the origin column; only the visual order changed.
    Reordered {
        opportunity_id: OpportunityId,
        target: DropTarget,
    },
    /// Released outside any valid target; the card returns to its origin.
    Cancelled {
        opportunity_id: OpportunityId,
        revert_to: DropTarget,
    },
    /// Released before the activation distance; treated as a click.
    Clicked { opportunity_id: OpportunityId },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DragError {
    #[error("A drag session for {0} is already active")]
    SessionActive(OpportunityId),

    #[error("No drop is being resolved (session is {0})")]
    NotResolving(DragPhase),
}
