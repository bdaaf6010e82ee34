use serde::{Deserialize, Serialize};

use super::opportunity::OpportunityId;
use super::stage::StageId;

/// What initiated a stage change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Trigger {
    /// Card dropped onto another column.
    Drag,
    /// Click on a stage in the opportunity's stage bar.
    Click,
    /// Dedicated action such as "mark as won" or "mark as lost".
    ExplicitAction,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Drag => write!(f, "drag"),
            Trigger::Click => write!(f, "click"),
            Trigger::ExplicitAction => write!(f, "explicit-action"),
        }
    }
}

impl std::str::FromStr for Trigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drag" => Ok(Trigger::Drag),
            "click" => Ok(Trigger::Click),
            "explicit-action" | "explicit" => Ok(Trigger::ExplicitAction),
            other => Err(format!(
                "unknown trigger '{other}' (expected drag, click or explicit-action)"
            )),
        }
    }
}

/// In-memory intent to move an opportunity between stages. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest {
    pub opportunity_id: OpportunityId,
    pub from_stage_id: StageId,
    pub to_stage_id: StageId,
    pub trigger: Trigger,
}

impl TransitionRequest {
    pub fn new(
        opportunity_id: OpportunityId,
        from_stage_id: StageId,
        to_stage_id: StageId,
        trigger: Trigger,
    ) -> Self {
        Self {
            opportunity_id,
            from_stage_id,
            to_stage_id,
            trigger,
        }
    }
}
