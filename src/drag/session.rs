use std::sync::Arc;

use tracing::debug;

use super::types::{
    DragError, DragEvent, DragOrigin, DragPhase, DragSessionState, DropTarget, Point,
};
use crate::graph::{IllegalMove, StageGraph};
use crate::models::constants::DEFAULT_DRAG_ACTIVATION_DISTANCE;
use crate::models::{OpportunityId, TransitionRequest, Trigger};

#[derive(Debug, Clone, PartialEq)]
enum Hover {
    Candidate,
    Rejected(DropTarget),
    Outside,
}

#[derive(Debug, Clone, PartialEq)]
struct ActiveDrag {
    origin: DragOrigin,
    candidate: DropTarget,
    hover: Hover,
}

impl ActiveDrag {
    fn state(&self) -> DragSessionState {
        DragSessionState {
            active_opportunity_id: self.origin.opportunity_id.clone(),
            origin_stage_id: self.origin.stage_id.clone(),
            current_candidate_stage_id: self.candidate.stage_id.clone(),
            current_candidate_index_within_stage: self.candidate.index,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum DragState {
    Idle,
    Pressed { origin: DragOrigin, at: Point },
    Dragging(ActiveDrag),
    Resolving(ActiveDrag),
}

/// Pointer-driven card move, independent of any drag library.
///
/// Only one session is active at a time; a pointer-down while the session is
/// not idle is refused. Legality of each hovered column is checked against the
/// stage graph with `Trigger::Drag`, so skip moves and terminal columns never
/// show as accepting targets.
#[derive(Debug, Clone)]
pub struct DragSession {
    graph: Arc<StageGraph>,
    activation_distance: f64,
    state: DragState,
}

impl DragSession {
    pub fn new(graph: Arc<StageGraph>) -> Self {
        Self::with_activation_distance(graph, DEFAULT_DRAG_ACTIVATION_DISTANCE)
    }

    pub fn with_activation_distance(graph: Arc<StageGraph>, activation_distance: f64) -> Self {
        Self {
            graph,
            activation_distance,
            state: DragState::Idle,
        }
    }

    pub fn phase(&self) -> DragPhase {
        match self.state {
            DragState::Idle => DragPhase::Idle,
            DragState::Pressed { .. } => DragPhase::Pressed,
            DragState::Dragging(_) => DragPhase::Dragging,
            DragState::Resolving(_) => DragPhase::Resolving,
        }
    }

    pub fn snapshot(&self) -> Option<DragSessionState> {
        match &self.state {
            DragState::Dragging(drag) | DragState::Resolving(drag) => Some(drag.state()),
            DragState::Idle | DragState::Pressed { .. } => None,
        }
    }

    /// Where the active card should be drawn, if a card is in flight.
    pub fn visual_position(&self) -> Option<DropTarget> {
        match &self.state {
            DragState::Dragging(drag) | DragState::Resolving(drag) => Some(drag.candidate.clone()),
            DragState::Pressed { origin, .. } => Some(origin.target()),
            DragState::Idle => None,
        }
    }

    fn active_opportunity(&self) -> Option<&OpportunityId> {
        match &self.state {
            DragState::Idle => None,
            DragState::Pressed { origin, .. } => Some(&origin.opportunity_id),
            DragState::Dragging(drag) | DragState::Resolving(drag) => {
                Some(&drag.origin.opportunity_id)
            }
        }
    }

    pub fn pointer_down(&mut self, origin: DragOrigin, at: Point) -> Result<(), DragError> {
        if let Some(active) = self.active_opportunity() {
            return Err(DragError::SessionActive(active.clone()));
        }
        debug!(opportunity = %origin.opportunity_id, stage = %origin.stage_id, "pointer down");
        self.state = DragState::Pressed { origin, at };
        Ok(())
    }

    /// Feed a pointer move; `over` is the drop target under the pointer, if any.
    pub fn pointer_move(&mut self, at: Point, over: Option<DropTarget>) -> Vec<DragEvent> {
        let mut events = Vec::new();

        if let DragState::Pressed { origin, at: start } = &self.state {
            if start.distance_to(&at) < self.activation_distance {
                return events;
            }
            let drag = ActiveDrag {
                candidate: origin.target(),
                origin: origin.clone(),
                hover: Hover::Candidate,
            };
            debug!(opportunity = %drag.origin.opportunity_id, "drag started");
            events.push(DragEvent::Started(drag.state()));
            self.state = DragState::Dragging(drag);
        }

        let DragState::Dragging(drag) = &mut self.state else {
            return events;
        };

        let Some(target) = over else {
            drag.hover = Hover::Outside;
            return events;
        };

        match evaluate(&self.graph, &drag.origin, &target) {
            Ok(()) => {
                drag.hover = Hover::Candidate;
                if drag.candidate != target {
                    drag.candidate = target.clone();
                    events.push(DragEvent::CandidateChanged(target));
                }
            }
            Err(reason) => {
                if drag.hover != Hover::Rejected(target.clone()) {
                    debug!(stage = %target.stage_id, %reason, "drop target rejected");
                    drag.hover = Hover::Rejected(target.clone());
                    events.push(DragEvent::CandidateRejected { target, reason });
                }
            }
        }
        events
    }

    /// Release the pointer over `over` (or outside any target when `None`).
    pub fn pointer_up(&mut self, over: Option<DropTarget>) -> Option<DragEvent> {
        match std::mem::replace(&mut self.state, DragState::Idle) {
            DragState::Idle => None,
            DragState::Pressed { origin, .. } => Some(DragEvent::Clicked {
                opportunity_id: origin.opportunity_id,
            }),
            DragState::Resolving(drag) => {
                self.state = DragState::Resolving(drag);
                None
            }
            DragState::Dragging(drag) => {
                let accepted =
                    over.filter(|target| evaluate(&self.graph, &drag.origin, target).is_ok());
                let Some(target) = accepted else {
                    debug!(
                        opportunity = %drag.origin.opportunity_id,
                        "drop outside valid target, reverting"
                    );
                    return Some(DragEvent::Cancelled {
                        opportunity_id: drag.origin.opportunity_id.clone(),
                        revert_to: drag.origin.target(),
                    });
                };

                if target.stage_id == drag.origin.stage_id {
                    return Some(DragEvent::Reordered {
                        opportunity_id: drag.origin.opportunity_id,
                        target,
                    });
                }

                let request = TransitionRequest::new(
                    drag.origin.opportunity_id.clone(),
                    drag.origin.stage_id.clone(),
                    target.stage_id.clone(),
                    Trigger::Drag,
                );
                debug!(opportunity = %request.opportunity_id, to = %request.to_stage_id, "dropped");
                self.state = DragState::Resolving(ActiveDrag {
                    origin: drag.origin,
                    candidate: target,
                    hover: Hover::Candidate,
                });
                Some(DragEvent::Dropped(request))
            }
        }
    }

    /// Abort the interaction (escape key, navigation). Resolving drops are
    /// owned by the coordinator and are not affected.
    pub fn cancel(&mut self) -> Option<DragEvent> {
        match std::mem::replace(&mut self.state, DragState::Idle) {
            DragState::Dragging(drag) => Some(DragEvent::Cancelled {
                opportunity_id: drag.origin.opportunity_id.clone(),
                revert_to: drag.origin.target(),
            }),
            DragState::Resolving(drag) => {
                self.state = DragState::Resolving(drag);
                None
            }
            DragState::Idle | DragState::Pressed { .. } => None,
        }
    }

    /// Return to idle once the coordinator has handled the dropped request.
    pub fn finish_resolving(&mut self) -> Result<(), DragError> {
        match self.state {
            DragState::Resolving(_) => {
                self.state = DragState::Idle;
                Ok(())
            }
            _ => Err(DragError::NotResolving(self.phase())),
        }
    }
}

fn evaluate(
    graph: &StageGraph,
    origin: &DragOrigin,
    target: &DropTarget,
) -> Result<(), IllegalMove> {
    if target.stage_id == origin.stage_id {
        return Ok(());
    }
    graph
        .admit(&origin.stage_id, &target.stage_id, Trigger::Drag)
        .map(|_| ())
}
