use serde::{Deserialize, Serialize};

use crate::models::{FieldName, Opportunity, Presence, TerminalKind};

/// One field a stage expects before an opportunity may leave it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub field: FieldName,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub presence: Presence,
}

fn default_required() -> bool {
    true
}

impl FieldSpec {
    pub fn required(field: FieldName) -> Self {
        Self {
            field,
            required: true,
            presence: Presence::Present,
        }
    }

    pub fn positive(field: FieldName) -> Self {
        Self {
            field,
            required: true,
            presence: Presence::Positive,
        }
    }

    pub fn optional(field: FieldName) -> Self {
        Self {
            field,
            required: false,
            presence: Presence::Present,
        }
    }

    /// A spec is unmet when it is required and its presence rule fails.
    pub fn is_unmet(&self, opportunity: &Opportunity) -> bool {
        self.required && !self.presence.holds(opportunity.field(self.field))
    }
}

/// Single-value capture demanded before closing an opportunity as Won or Lost.
/// Any one of `accepted` being present satisfies the rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalCaptureRule {
    pub kind: TerminalKind,
    pub accepted: Vec<FieldName>,
}

impl TerminalCaptureRule {
    pub fn won_default() -> Self {
        Self {
            kind: TerminalKind::Won,
            accepted: vec![FieldName::WonDocumentRef, FieldName::WonOrderDescription],
        }
    }

    pub fn lost_default() -> Self {
        Self {
            kind: TerminalKind::Lost,
            accepted: vec![FieldName::LostReason],
        }
    }

    pub fn is_satisfied(&self, opportunity: &Opportunity) -> bool {
        self.accepted
            .iter()
            .any(|field| Presence::Present.holds(opportunity.field(*field)))
    }
}
