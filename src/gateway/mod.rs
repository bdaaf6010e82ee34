//! Contract the engine needs from the backend of record.

mod memory;


pub use memory::{GatewayCall, MemoryGateway};

use crate::models::{FieldPatch, Opportunity, OpportunityId, Stage, StageId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Persistence call timed out")]
    Timeout,

    /// The record changed since the client's view was taken.
    #[error("Record changed on the server (expected version {expected}, found {actual})")]
    Conflict { expected: u64, actual: u64 },

    #[error("Server rejected the write: {0}")]
    Rejected(String),

    #[error("Opportunity not found: {0}")]
    NotFound(OpportunityId),
}

impl GatewayError {
    /// Whether retrying the same call may succeed without a refresh.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Network(_) | GatewayError::Timeout)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, GatewayError::Conflict { .. })
    }
}

/// Backend of record for opportunities and the stage list.
///
/// Writes carry the version the client last saw; a backend that tracks
/// versions answers a mismatch with `GatewayError::Conflict`.
#[async_trait::async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Move a record to another stage.
    async fn move_stage(
        &self,
        id: &OpportunityId,
        stage: &StageId,
        expected_version: u64,
    ) -> Result<Opportunity, GatewayError>;

    /// Write a partial update. A stage in the patch is written in the same call.
    async fn update_fields(
        &self,
        id: &OpportunityId,
        patch: &FieldPatch,
        expected_version: u64,
    ) -> Result<Opportunity, GatewayError>;

    /// Ordered stage list.
    async fn list_stages(&self) -> Result<Vec<Stage>, GatewayError>;

    async fn list_opportunities(&self) -> Result<Vec<Opportunity>, GatewayError>;

    /// Current server copy of one record, used to refresh after a conflict.
    async fn get_opportunity(&self, id: &OpportunityId) -> Result<Opportunity, GatewayError>;

    async fn create_opportunity(&self, record: &Opportunity) -> Result<Opportunity, GatewayError>;
}
