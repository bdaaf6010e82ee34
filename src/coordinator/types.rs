use crate::gateway::GatewayError;
use crate::graph::IllegalMove;
use crate::models::{
    FieldName, Opportunity, OpportunityId, PatchError, StageId, TerminalKind, TransitionRequest,
};
use crate::requirements::FieldSpec;
use crate::store::StoreError;

/// Lifecycle of one transition request, used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPhase {
    Requested,
    LegalityChecked,
    ValidationChecked,
    AwaitingGapFill,
    AwaitingTerminalCapture,
    Committing,
    Committed,
    Rejected,
    RolledBack,
    Cancelled,
}

impl std::fmt::Display for TransitionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransitionPhase::Requested => "requested",
            TransitionPhase::LegalityChecked => "legality-checked",
            TransitionPhase::ValidationChecked => "validation-checked",
            TransitionPhase::AwaitingGapFill => "awaiting-gap-fill",
            TransitionPhase::AwaitingTerminalCapture => "awaiting-terminal-capture",
            TransitionPhase::Committing => "committing",
            TransitionPhase::Committed => "committed",
            TransitionPhase::Rejected => "rejected",
            TransitionPhase::RolledBack => "rolled-back",
            TransitionPhase::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

/// Forward move held back until the listed fields are supplied.
#[derive(Debug, Clone, PartialEq)]
pub struct GapFill {
    pub request: TransitionRequest,
    /// Key of the stage being left; its requirements gate the move.
    pub stage_key: String,
    pub missing: Vec<FieldSpec>,
}

impl GapFill {
    pub fn fields(&self) -> Vec<FieldName> {
        self.missing.iter().map(|spec| spec.field).collect()
    }
}

/// Move into Won or Lost waiting for its single closing value.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalCapture {
    pub request: TransitionRequest,
    pub kind: TerminalKind,
    /// Any one of these fields completes the capture.
    pub accepted: Vec<FieldName>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    Committed(Opportunity),
    /// Structurally illegal; nothing changed.
    Rejected(IllegalMove),
    AwaitingGapFill(GapFill),
    AwaitingTerminalCapture(TerminalCapture),
    Cancelled,
}

impl TransitionOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, TransitionOutcome::Committed(_))
    }

    pub fn committed(&self) -> Option<&Opportunity> {
        match self {
            TransitionOutcome::Committed(record) => Some(record),
            _ => None,
        }
    }
}

/// Observable signal for every transition that ends or pauses.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionEvent {
    Rejected {
        request: TransitionRequest,
        reason: IllegalMove,
    },
    GapFillRequested(GapFill),
    CaptureRequested(TerminalCapture),
    Committed {
        request: TransitionRequest,
        record: Opportunity,
    },
    RolledBack {
        request: TransitionRequest,
        error: GatewayError,
    },
    /// A queued move found the record somewhere else when its turn came.
    Superseded { request: TransitionRequest },
    Cancelled { request: TransitionRequest },
}

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("Unknown opportunity: {0}")]
    UnknownOpportunity(OpportunityId),

    #[error("Request is stale: {opportunity_id} is in stage {actual}, not {expected}")]
    StaleRequest {
        opportunity_id: OpportunityId,
        expected: StageId,
        actual: StageId,
    },

    #[error("Field '{field}' does not close an opportunity as {kind}")]
    InvalidCapture { field: FieldName, kind: TerminalKind },

    #[error("A value for '{0}' is required")]
    EmptyCapture(FieldName),

    #[error("{opportunity_id} was changed elsewhere; refresh before retrying")]
    Conflict {
        opportunity_id: OpportunityId,
        #[source]
        source: GatewayError,
    },

    #[error("Failed to save {opportunity_id}")]
    Persistence {
        opportunity_id: OpportunityId,
        #[source]
        source: GatewayError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Patch(#[from] PatchError),
}

impl TransitionError {
    /// Whether the user may retry the same transition as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransitionError::Persistence { .. })
    }
}
