pub mod constants;
pub mod field;
pub mod opportunity;
pub mod stage;
pub mod transition;

pub use field::{FieldName, FieldValue, Presence};
pub use opportunity::{FieldPatch, Opportunity, OpportunityId, Patch, PatchError};
pub use stage::{Stage, StageId, TerminalKind};
pub use transition::{TransitionRequest, Trigger};
