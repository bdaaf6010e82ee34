use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::oneshot;
use tracing::debug;

use super::{GatewayError, PersistenceGateway};
use crate::models::{FieldPatch, Opportunity, OpportunityId, Stage, StageId};

/// Write received by a `MemoryGateway`, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    MoveStage {
        id: OpportunityId,
        stage: StageId,
        expected_version: u64,
    },
    UpdateFields {
        id: OpportunityId,
        patch: FieldPatch,
        expected_version: u64,
    },
    Create(OpportunityId),
}

#[derive(Default)]
struct MemoryState {
    records: BTreeMap<OpportunityId, Opportunity>,
    failures: VecDeque<GatewayError>,
    holds: VecDeque<oneshot::Receiver<()>>,
    calls: Vec<GatewayCall>,
}

/// In-memory backend of record.
///
/// Tracks versions like a real server and can be told to fail or pause the
/// next writes, which makes interleavings reproducible.
pub struct MemoryGateway {
    stages: Vec<Stage>,
    state: Mutex<MemoryState>,
}

impl MemoryGateway {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            stages,
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a record as if it already existed on the server.
    pub fn insert(&self, record: Opportunity) {
        self.lock().records.insert(record.id.clone(), record);
    }

    pub fn record(&self, id: &OpportunityId) -> Option<Opportunity> {
        self.lock().records.get(id).cloned()
    }

    /// Make the next write fail with `error`. Queued failures are used in order.
    pub fn fail_next(&self, error: GatewayError) {
        self.lock().failures.push_back(error);
    }

    /// Pause the next write until the returned sender fires (or is dropped).
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (release, hold) = oneshot::channel();
        self.lock().holds.push_back(hold);
        release
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    /// Change a record behind the client's back, as another session would.
    pub fn touch_remotely(&self, id: &OpportunityId, stage: &StageId) -> Option<Opportunity> {
        let mut state = self.lock();
        let record = state.records.get_mut(id)?;
        record.current_stage_id = stage.clone();
        record.version += 1;
        record.updated_at = Utc::now();
        Some(record.clone())
    }

    async fn write(
        &self,
        call: GatewayCall,
        id: &OpportunityId,
        expected_version: u64,
        patch: &FieldPatch,
    ) -> Result<Opportunity, GatewayError> {
        let (hold, failure) = {
            let mut state = self.lock();
            state.calls.push(call);
            (state.holds.pop_front(), state.failures.pop_front())
        };

        if let Some(hold) = hold {
            debug!(opportunity = %id, "write held");
            let _ = hold.await;
        }
        if let Some(error) = failure {
            debug!(opportunity = %id, %error, "injected failure");
            return Err(error);
        }

        let mut state = self.lock();
        let record = state
            .records
            .get_mut(id)
            .ok_or_else(|| GatewayError::NotFound(id.clone()))?;
        if record.version != expected_version {
            return Err(GatewayError::Conflict {
                expected: expected_version,
                actual: record.version,
            });
        }
        if let Some(stage) = &patch.stage {
            if !self.stages.iter().any(|s| &s.id == stage) {
                return Err(GatewayError::Rejected(format!("unknown stage {stage}")));
            }
        }

        patch.apply_to(record);
        record.version += 1;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }
}

#[async_trait::async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn move_stage(
        &self,
        id: &OpportunityId,
        stage: &StageId,
        expected_version: u64,
    ) -> Result<Opportunity, GatewayError> {
        let call = GatewayCall::MoveStage {
            id: id.clone(),
            stage: stage.clone(),
            expected_version,
        };
        let patch = FieldPatch::move_to(stage.clone());
        self.write(call, id, expected_version, &patch).await
    }

    async fn update_fields(
        &self,
        id: &OpportunityId,
        patch: &FieldPatch,
        expected_version: u64,
    ) -> Result<Opportunity, GatewayError> {
        let call = GatewayCall::UpdateFields {
            id: id.clone(),
            patch: patch.clone(),
            expected_version,
        };
        self.write(call, id, expected_version, patch).await
    }

    async fn list_stages(&self) -> Result<Vec<Stage>, GatewayError> {
        Ok(self.stages.clone())
    }

    async fn list_opportunities(&self) -> Result<Vec<Opportunity>, GatewayError> {
        Ok(self.lock().records.values().cloned().collect())
    }

    async fn get_opportunity(&self, id: &OpportunityId) -> Result<Opportunity, GatewayError> {
        self.lock()
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(id.clone()))
    }

    async fn create_opportunity(&self, record: &Opportunity) -> Result<Opportunity, GatewayError> {
        let failure = {
            let mut state = self.lock();
            state.calls.push(GatewayCall::Create(record.id.clone()));
            state.failures.pop_front()
        };
        if let Some(error) = failure {
            return Err(error);
        }

        let mut state = self.lock();
        if state.records.contains_key(&record.id) {
            return Err(GatewayError::Rejected(format!(
                "opportunity {} already exists",
                record.id
            )));
        }
        let mut created = record.clone();
        created.version = 1;
        state.records.insert(created.id.clone(), created.clone());
        Ok(created)
    }
}
