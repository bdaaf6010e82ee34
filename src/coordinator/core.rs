use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::retry::{should_retry, CommitPolicy};
use super::types::{
    GapFill, TerminalCapture, TransitionError, TransitionEvent, TransitionOutcome, TransitionPhase,
};
use crate::drag::DragSession;
use crate::gateway::{GatewayError, PersistenceGateway};
use crate::graph::{IllegalMove, Legality, StageGraph};
use crate::models::constants::EVENT_CHANNEL_CAPACITY;
use crate::models::{
    FieldName, FieldPatch, Opportunity, OpportunityId, StageId, TransitionRequest, Trigger,
};
use crate::requirements::TransitionValidator;
use crate::store::{Mutation, OptimisticStore, StoreError};

/// Drives a transition request from legality check to commit or rollback.
pub struct TransitionCoordinator {
    graph: Arc<StageGraph>,
    validator: Arc<TransitionValidator>,
    store: Arc<OptimisticStore>,
    gateway: Arc<dyn PersistenceGateway>,
    policy: CommitPolicy,
    events: broadcast::Sender<TransitionEvent>,
}

impl TransitionCoordinator {
    pub fn new(
        graph: Arc<StageGraph>,
        validator: Arc<TransitionValidator>,
        store: Arc<OptimisticStore>,
        gateway: Arc<dyn PersistenceGateway>,
        policy: CommitPolicy,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            graph,
            validator,
            store,
            gateway,
            policy,
            events,
        }
    }

    pub fn graph(&self) -> &Arc<StageGraph> {
        &self.graph
    }

    pub fn validator(&self) -> &Arc<TransitionValidator> {
        &self.validator
    }

    pub fn store(&self) -> &Arc<OptimisticStore> {
        &self.store
    }

    pub fn policy(&self) -> &CommitPolicy {
        &self.policy
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransitionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: TransitionEvent) {
        let _ = self.events.send(event);
    }

    fn current(&self, request: &TransitionRequest) -> Result<Opportunity, TransitionError> {
        let record = self
            .store
            .get(&request.opportunity_id)
            .ok_or_else(|| TransitionError::UnknownOpportunity(request.opportunity_id.clone()))?;
        if record.current_stage_id != request.from_stage_id {
            return Err(TransitionError::StaleRequest {
                opportunity_id: request.opportunity_id.clone(),
                expected: request.from_stage_id.clone(),
                actual: record.current_stage_id,
            });
        }
        Ok(record)
    }

    /// Build a request from the record's current stage, as the stage
    /// header click and the Won/Lost buttons do.
    pub async fn move_to_stage(
        &self,
        id: &OpportunityId,
        to: &StageId,
        trigger: Trigger,
    ) -> Result<TransitionOutcome, TransitionError> {
        let record = self
            .store
            .get(id)
            .ok_or_else(|| TransitionError::UnknownOpportunity(id.clone()))?;
        let request =
            TransitionRequest::new(id.clone(), record.current_stage_id, to.clone(), trigger);
        self.request(request).await
    }

    /// Handle a drop from a drag session and return the session to idle.
    pub async fn handle_drop(
        &self,
        session: &mut DragSession,
        request: TransitionRequest,
    ) -> Result<TransitionOutcome, TransitionError> {
        let outcome = self.request(request).await;
        if let Err(e) = session.finish_resolving() {
            warn!(error = %e, "drop handled without a resolving drag session");
        }
        outcome
    }

    /// Re-read a record from the backend after a conflict.
    ///
    /// The server copy replaces the working copy, so the next request
    /// builds on the current version.
    pub async fn refresh(&self, id: &OpportunityId) -> Result<Opportunity, TransitionError> {
        let record = self.gateway.get_opportunity(id).await.map_err(|source| {
            TransitionError::Persistence {
                opportunity_id: id.clone(),
                source,
            }
        })?;
        self.store.refresh(record.clone())?;
        info!(
            opportunity = %id,
            stage = %record.current_stage_id,
            version = record.version,
            "opportunity refreshed"
        );
        Ok(record)
    }

    pub async fn request(
        &self,
        request: TransitionRequest,
    ) -> Result<TransitionOutcome, TransitionError> {
        info!(
            opportunity = %request.opportunity_id,
            from = %request.from_stage_id,
            to = %request.to_stage_id,
            trigger = %request.trigger,
            phase = %TransitionPhase::Requested,
            "transition"
        );
        let record = self.current(&request)?;

        let admitted = self
            .graph
            .admit(&request.from_stage_id, &request.to_stage_id, request.trigger);
        debug!(
            opportunity = %request.opportunity_id,
            legality = ?admitted,
            phase = %TransitionPhase::LegalityChecked,
            "transition"
        );

        match admitted {
            Ok(Legality::Backward | Legality::Reopen) => {
                let patch = FieldPatch::move_to(request.to_stage_id.clone());
                self.commit(request, patch).await.map(TransitionOutcome::Committed)
            }
            Ok(Legality::Forward { .. }) => {
                let stage_key = self.stage_key(&request.from_stage_id);
                let missing = self.validator.missing_fields(&record, &stage_key);
                debug!(
                    opportunity = %request.opportunity_id,
                    missing = missing.len(),
                    phase = %TransitionPhase::ValidationChecked,
                    "transition"
                );
                if missing.is_empty() {
                    let patch = FieldPatch::move_to(request.to_stage_id.clone());
                    return self.commit(request, patch).await.map(TransitionOutcome::Committed);
                }
                Ok(self.request_gap_fill(GapFill {
                    request,
                    stage_key,
                    missing,
                }))
            }
            Ok(Legality::ToTerminal(kind)) => {
                let capture = TerminalCapture {
                    request,
                    kind,
                    accepted: self.validator.capture_rule(kind).accepted.clone(),
                };
                info!(
                    opportunity = %capture.request.opportunity_id,
                    %kind,
                    phase = %TransitionPhase::AwaitingTerminalCapture,
                    "transition"
                );
                self.emit(TransitionEvent::CaptureRequested(capture.clone()));
                Ok(TransitionOutcome::AwaitingTerminalCapture(capture))
            }
            Ok(Legality::SameStage) | Err(_) => {
                let reason = admitted
                    .err()
                    .unwrap_or_else(|| IllegalMove::SameStage(request.from_stage_id.clone()));
                Ok(self.reject(request, reason))
            }
        }
    }

    /// Complete a gap-fill with user-supplied values.
    ///
    /// The values and the stage move are committed as one mutation. If the
    /// values still leave required fields empty, a new gap-fill is returned.
    pub async fn submit_gap_fill(
        &self,
        gap: GapFill,
        values: FieldPatch,
    ) -> Result<TransitionOutcome, TransitionError> {
        let record = self.current(&gap.request)?;
        let missing = self.validator.missing_after(&record, &values, &gap.stage_key);
        if !missing.is_empty() {
            return Ok(self.request_gap_fill(GapFill { missing, ..gap }));
        }

        let patch = values.with_stage(gap.request.to_stage_id.clone());
        self.commit(gap.request, patch)
            .await
            .map(TransitionOutcome::Committed)
    }

    /// Complete a Won/Lost move with its closing value.
    pub async fn submit_terminal_capture(
        &self,
        capture: TerminalCapture,
        field: FieldName,
        value: impl Into<String>,
    ) -> Result<TransitionOutcome, TransitionError> {
        if !capture.accepted.contains(&field) {
            return Err(TransitionError::InvalidCapture {
                field,
                kind: capture.kind,
            });
        }
        let value = value.into();
        if value.trim().is_empty() {
            return Err(TransitionError::EmptyCapture(field));
        }
        self.current(&capture.request)?;

        let patch =
            FieldPatch::move_to(capture.request.to_stage_id.clone()).with_text(field, value)?;
        self.commit(capture.request, patch)
            .await
            .map(TransitionOutcome::Committed)
    }

    /// Abandon a paused transition. Nothing was applied, so nothing reverts.
    pub fn cancel(&self, request: TransitionRequest) -> TransitionOutcome {
        info!(
            opportunity = %request.opportunity_id,
            phase = %TransitionPhase::Cancelled,
            "transition"
        );
        self.emit(TransitionEvent::Cancelled { request });
        TransitionOutcome::Cancelled
    }

    /// Persist a new record, then add it to the working copy in the initial stage.
    pub async fn create_opportunity(
        &self,
        title: impl Into<String>,
    ) -> Result<Opportunity, TransitionError> {
        let draft = Opportunity::new(title, self.graph.initial_stage().id.clone());
        let created = self
            .gateway
            .create_opportunity(&draft)
            .await
            .map_err(|source| TransitionError::Persistence {
                opportunity_id: draft.id.clone(),
                source,
            })?;
        self.store.insert_created(created.clone())?;
        info!(opportunity = %created.id, stage = %created.current_stage_id, "opportunity created");
        Ok(created)
    }

    fn stage_key(&self, id: &StageId) -> String {
        self.graph
            .stage(id)
            .map(|stage| stage.key.clone())
            .unwrap_or_else(|| id.as_str().to_string())
    }

    fn reject(&self, request: TransitionRequest, reason: IllegalMove) -> TransitionOutcome {
        debug!(
            opportunity = %request.opportunity_id,
            %reason,
            phase = %TransitionPhase::Rejected,
            "transition"
        );
        self.emit(TransitionEvent::Rejected {
            request,
            reason: reason.clone(),
        });
        TransitionOutcome::Rejected(reason)
    }

    fn request_gap_fill(&self, gap: GapFill) -> TransitionOutcome {
        info!(
            opportunity = %gap.request.opportunity_id,
            fields = ?gap.fields(),
            phase = %TransitionPhase::AwaitingGapFill,
            "transition"
        );
        self.emit(TransitionEvent::GapFillRequested(gap.clone()));
        TransitionOutcome::AwaitingGapFill(gap)
    }

    /// Apply the patch speculatively, persist it, then commit or roll back.
    async fn commit(
        &self,
        request: TransitionRequest,
        patch: FieldPatch,
    ) -> Result<Opportunity, TransitionError> {
        let id = request.opportunity_id.clone();
        let mutation =
            Mutation::new(id.clone(), patch.clone()).expecting_stage(request.from_stage_id.clone());

        let token = match self.store.apply_in_order(mutation).await {
            Ok(token) => token,
            Err(e @ StoreError::Superseded { .. }) => {
                warn!(opportunity = %id, error = %e, "transition superseded");
                self.emit(TransitionEvent::Superseded { request });
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };
        debug!(opportunity = %id, %token, phase = %TransitionPhase::Committing, "transition");

        // Speculative apply leaves the version alone, so this is the version the write builds on.
        let Some(base_version) = self.store.get(&id).map(|record| record.version) else {
            self.store.rollback(token)?;
            return Err(TransitionError::UnknownOpportunity(id));
        };

        match self.persist(&id, &patch, base_version).await {
            Ok(record) => {
                if let Err(e) = self.store.commit(token, record.clone()) {
                    warn!(opportunity = %id, error = %e, "server record rejected by store");
                    self.store.rollback(token)?;
                    return Err(e.into());
                }
                info!(
                    opportunity = %id,
                    stage = %record.current_stage_id,
                    version = record.version,
                    phase = %TransitionPhase::Committed,
                    "transition"
                );
                self.emit(TransitionEvent::Committed {
                    request,
                    record: record.clone(),
                });
                Ok(record)
            }
            Err(error) => {
                self.store.rollback(token)?;
                warn!(
                    opportunity = %id,
                    %error,
                    phase = %TransitionPhase::RolledBack,
                    "transition"
                );
                self.emit(TransitionEvent::RolledBack {
                    request,
                    error: error.clone(),
                });
                if error.is_conflict() {
                    Err(TransitionError::Conflict {
                        opportunity_id: id,
                        source: error,
                    })
                } else {
                    Err(TransitionError::Persistence {
                        opportunity_id: id,
                        source: error,
                    })
                }
            }
        }
    }

    async fn persist(
        &self,
        id: &OpportunityId,
        patch: &FieldPatch,
        base_version: u64,
    ) -> Result<Opportunity, GatewayError> {
        let mut retries = 0;
        loop {
            match self.call_gateway(id, patch, base_version).await {
                Ok(record) => return Ok(record),
                Err(error) if should_retry(&error, retries, self.policy.max_retries) => {
                    retries += 1;
                    let delay = self.policy.backoff(retries);
                    warn!(
                        opportunity = %id,
                        %error,
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        "retrying persistence call"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn call_gateway(
        &self,
        id: &OpportunityId,
        patch: &FieldPatch,
        base_version: u64,
    ) -> Result<Opportunity, GatewayError> {
        let call = async {
            match &patch.stage {
                Some(stage) if patch.is_stage_only() => {
                    self.gateway.move_stage(id, stage, base_version).await
                }
                _ => self.gateway.update_fields(id, patch, base_version).await,
            }
        };

        match self.policy.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or(Err(GatewayError::Timeout)),
            None => call.await,
        }
    }
}
