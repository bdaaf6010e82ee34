use tokio::sync::oneshot;

use crate::models::{FieldPatch, Opportunity, OpportunityId, Stage, StageId};

/// Handle for one speculative change, returned by `apply`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutationToken(pub(super) u64);

impl MutationToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for MutationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Speculative change to one opportunity.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub opportunity_id: OpportunityId,
    /// Stage the record must still be in when the mutation is applied.
    /// Guards queued moves against landing on a rolled-back record.
    pub expected_stage: Option<StageId>,
    pub patch: FieldPatch,
}

impl Mutation {
    pub fn new(opportunity_id: OpportunityId, patch: FieldPatch) -> Self {
        Self {
            opportunity_id,
            expected_stage: None,
            patch,
        }
    }

    pub fn expecting_stage(mut self, stage: StageId) -> Self {
        self.expected_stage = Some(stage);
        self
    }
}

/// Result of `OptimisticStore::apply`.
#[derive(Debug)]
pub enum ApplyOutcome {
    /// Applied to the working copy; the caller may persist it now.
    Applied(MutationToken),
    /// Another mutation on the same record is in flight. `ready` fires once
    /// this one has been applied (or refused) in submission order.
    Queued {
        token: MutationToken,
        ready: oneshot::Receiver<Result<(), StoreError>>,
    },
}

impl ApplyOutcome {
    pub fn token(&self) -> MutationToken {
        match self {
            ApplyOutcome::Applied(token) => *token,
            ApplyOutcome::Queued { token, .. } => *token,
        }
    }
}

/// Change notification from another session or the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStageChange {
    pub opportunity_id: OpportunityId,
    pub new_stage_id: StageId,
    /// Server version after the change, when the feed provides one.
    pub version: Option<u64>,
}

/// Notification sent to subscribers after the working copy changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Hydrated { count: usize },
    Inserted(OpportunityId),
    Applied {
        opportunity_id: OpportunityId,
        token: MutationToken,
    },
    Committed {
        opportunity_id: OpportunityId,
        token: MutationToken,
    },
    RolledBack {
        opportunity_id: OpportunityId,
        token: MutationToken,
    },
    RemoteApplied(OpportunityId),
    Refreshed(OpportunityId),
}

impl StoreEvent {
    pub fn opportunity_id(&self) -> Option<&OpportunityId> {
        match self {
            StoreEvent::Hydrated { .. } => None,
            StoreEvent::Inserted(id)
            | StoreEvent::RemoteApplied(id)
            | StoreEvent::Refreshed(id) => Some(id),
            StoreEvent::Applied { opportunity_id, .. }
            | StoreEvent::Committed { opportunity_id, .. }
            | StoreEvent::RolledBack { opportunity_id, .. } => Some(opportunity_id),
        }
    }
}

/// One column of the kanban board.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardColumn {
    pub stage: Stage,
    pub cards: Vec<Opportunity>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Unknown opportunity: {0}")]
    UnknownOpportunity(OpportunityId),

    #[error("Mutation {token} is not in flight for {opportunity_id}")]
    NotInFlight {
        opportunity_id: OpportunityId,
        token: MutationToken,
    },

    #[error("Unknown mutation token: {0}")]
    UnknownToken(MutationToken),

    #[error("Server returned record {returned} while committing {expected}")]
    RecordMismatch {
        expected: OpportunityId,
        returned: OpportunityId,
    },

    #[error("Mutation on {opportunity_id} superseded: expected stage {expected}, record is in {actual}")]
    Superseded {
        opportunity_id: OpportunityId,
        expected: StageId,
        actual: StageId,
    },

    #[error("Opportunity {0} already exists")]
    DuplicateOpportunity(OpportunityId),

    #[error("Opportunity {0} has a pending mutation")]
    Pending(OpportunityId),

    #[error("Queued mutation was dropped before it could be applied")]
    Abandoned,
}
