use crate::models::{StageId, TerminalKind};

/// Structural classification of a move between two stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Legality {
    SameStage,
    /// Forward along the active sequence; `steps > 1` means stages would be skipped.
    Forward { steps: usize },
    Backward,
    ToTerminal(TerminalKind),
    /// Out of a terminal stage back into the active sequence.
    Reopen,
}

impl Legality {
    pub fn is_skip(&self) -> bool {
        matches!(self, Legality::Forward { steps } if *steps > 1)
    }

    pub fn is_single_step(&self) -> bool {
        matches!(self, Legality::Forward { steps: 1 })
    }

    /// Only a single forward step is gated by the origin stage's requirements.
    pub fn requires_validation(&self) -> bool {
        self.is_single_step()
    }
}

impl std::fmt::Display for Legality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Legality::SameStage => write!(f, "same stage"),
            Legality::Forward { steps } => write!(f, "forward ({steps} step(s))"),
            Legality::Backward => write!(f, "backward"),
            Legality::ToTerminal(kind) => write!(f, "to terminal ({kind})"),
            Legality::Reopen => write!(f, "reopen"),
        }
    }
}

/// Structurally illegal move, rejected before any validation or persistence.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IllegalMove {
    #[error("Cannot skip stages: {from} -> {to} crosses {steps} stages")]
    SkipsStages {
        from: StageId,
        to: StageId,
        steps: usize,
    },

    #[error("Stage {to} ({kind}) can only be reached through an explicit action")]
    TerminalRequiresExplicitAction { to: StageId, kind: TerminalKind },

    #[error("Opportunity is already in stage {0}")]
    SameStage(StageId),

    #[error("Unknown stage: {0}")]
    UnknownStage(StageId),
}
