//! Ordered pipeline stages and structural move legality
//!
//! The active stages form a strictly ordered line by `order_index`. Won and
//! Lost hang off that line and are only reachable through explicit actions.

mod legality;

#[cfg(test)]
mod tests;

use std::collections::HashSet;

use crate::models::{Stage, StageId, TerminalKind, Trigger};

pub use legality::{IllegalMove, Legality};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("No active stages defined")]
    NoActiveStages,

    #[error("Duplicate stage id: {0}")]
    DuplicateStage(StageId),

    #[error("Active stage orders must be unique and contiguous from 0, found {found:?}")]
    NonContiguousOrder { found: Vec<u32> },

    #[error("More than one {0} stage defined")]
    DuplicateTerminal(TerminalKind),

    #[error("Unknown stage: {0}")]
    UnknownStage(StageId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Active(usize),
    Terminal(TerminalKind),
}

/// Immutable stage model loaded once per session.
#[derive(Debug, Clone)]
pub struct StageGraph {
    /// Active stages sorted by `order_index`.
    active: Vec<Stage>,
    terminals: Vec<Stage>,
}

impl StageGraph {
    /// Build the graph from an unordered stage list.
    pub fn new(stages: Vec<Stage>) -> Result<Self, GraphError> {
        let mut seen = HashSet::new();
        for stage in &stages {
            if !seen.insert(stage.id.clone()) {
                return Err(GraphError::DuplicateStage(stage.id.clone()));
            }
        }

        let (terminals, mut active): (Vec<Stage>, Vec<Stage>) =
            stages.into_iter().partition(Stage::is_terminal);

        if active.is_empty() {
            return Err(GraphError::NoActiveStages);
        }

        for kind in [TerminalKind::Won, TerminalKind::Lost] {
            if terminals.iter().filter(|s| s.terminal == Some(kind)).count() > 1 {
                return Err(GraphError::DuplicateTerminal(kind));
            }
        }

        active.sort_by_key(|s| s.order_index);
        let contiguous = active
            .iter()
            .enumerate()
            .all(|(idx, stage)| stage.order_index as usize == idx);
        if !contiguous {
            return Err(GraphError::NonContiguousOrder {
                found: active.iter().map(|s| s.order_index).collect(),
            });
        }

        Ok(Self { active, terminals })
    }

    pub fn stage(&self, id: &StageId) -> Option<&Stage> {
        self.active
            .iter()
            .chain(self.terminals.iter())
            .find(|s| &s.id == id)
    }

    pub fn stage_by_key(&self, key: &str) -> Option<&Stage> {
        self.active
            .iter()
            .chain(self.terminals.iter())
            .find(|s| s.key == key)
    }

    /// Stage where new opportunities are created.
    pub fn initial_stage(&self) -> &Stage {
        // `new` guarantees at least one active stage
        &self.active[0]
    }

    pub fn active_stages(&self) -> &[Stage] {
        &self.active
    }

    pub fn terminal_stages(&self) -> &[Stage] {
        &self.terminals
    }

    pub fn terminal_stage(&self, kind: TerminalKind) -> Option<&Stage> {
        self.terminals.iter().find(|s| s.terminal == Some(kind))
    }

    /// Every stage in board order: active line first, then terminals.
    pub fn all_stages(&self) -> impl Iterator<Item = &Stage> {
        self.active.iter().chain(self.terminals.iter())
    }

    /// Index of an active stage within the ordered line.
    pub fn index_of(&self, id: &StageId) -> Option<usize> {
        match self.position(id)? {
            Position::Active(idx) => Some(idx),
            Position::Terminal(_) => None,
        }
    }

    /// The stage a single forward step leads to, if any.
    pub fn next_stage(&self, id: &StageId) -> Option<&Stage> {
        let idx = self.index_of(id)?;
        self.active.get(idx + 1)
    }

    fn position(&self, id: &StageId) -> Option<Position> {
        if let Some(idx) = self.active.iter().position(|s| &s.id == id) {
            return Some(Position::Active(idx));
        }
        self.terminals
            .iter()
            .find(|s| &s.id == id)
            .and_then(|s| s.terminal)
            .map(Position::Terminal)
    }

    /// Classify the move from one stage to another. Pure function.
    pub fn legality_of(&self, from: &StageId, to: &StageId) -> Result<Legality, GraphError> {
        let from_pos = self
            .position(from)
            .ok_or_else(|| GraphError::UnknownStage(from.clone()))?;
        let to_pos = self
            .position(to)
            .ok_or_else(|| GraphError::UnknownStage(to.clone()))?;

        if from == to {
            return Ok(Legality::SameStage);
        }

        let legality = match (from_pos, to_pos) {
            (_, Position::Terminal(kind)) => Legality::ToTerminal(kind),
            (Position::Terminal(_), Position::Active(_)) => Legality::Reopen,
            (Position::Active(from_idx), Position::Active(to_idx)) => {
                if to_idx < from_idx {
                    Legality::Backward
                } else {
                    Legality::Forward {
                        steps: to_idx - from_idx,
                    }
                }
            }
        };
        Ok(legality)
    }

    /// Check a move against the structural rules for the given trigger.
    ///
    /// Skips are rejected for every trigger. Terminal stages only accept
    /// `Trigger::ExplicitAction`. The returned legality still needs data
    /// validation when it is a single forward step.
    pub fn admit(
        &self,
        from: &StageId,
        to: &StageId,
        trigger: Trigger,
    ) -> Result<Legality, IllegalMove> {
        let legality = self.legality_of(from, to).map_err(|e| match e {
            GraphError::UnknownStage(id) => IllegalMove::UnknownStage(id),
            _ => IllegalMove::UnknownStage(to.clone()),
        })?;

        match legality {
            Legality::SameStage => Err(IllegalMove::SameStage(from.clone())),
            Legality::Forward { steps } if steps > 1 => Err(IllegalMove::SkipsStages {
                from: from.clone(),
                to: to.clone(),
                steps,
            }),
            Legality::ToTerminal(kind) if trigger != Trigger::ExplicitAction => {
                Err(IllegalMove::TerminalRequiresExplicitAction {
                    to: to.clone(),
                    kind,
                })
            }
            other => Ok(other),
        }
    }
}
