mod patch;
mod types;


pub use patch::{FieldPatch, Patch, PatchError};
pub use types::{Opportunity, OpportunityId};
