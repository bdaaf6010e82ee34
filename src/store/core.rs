use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use super::types::{
    ApplyOutcome, BoardColumn, Mutation, MutationToken, RemoteStageChange, StoreError, StoreEvent,
};
use crate::graph::StageGraph;
use crate::models::constants::EVENT_CHANNEL_CAPACITY;
use crate::models::{Opportunity, OpportunityId};

struct InFlight {
    token: MutationToken,
    /// Exact record captured at apply time; restored verbatim on rollback.
    before: Opportunity,
}

struct Waiter {
    token: MutationToken,
    mutation: Mutation,
    ready: oneshot::Sender<Result<(), StoreError>>,
}

#[derive(Default)]
struct Slot {
    in_flight: Option<InFlight>,
    waiting: VecDeque<Waiter>,
    deferred: Vec<RemoteStageChange>,
}

impl Slot {
    fn is_busy(&self) -> bool {
        self.in_flight.is_some() || !self.waiting.is_empty()
    }
}

#[derive(Default)]
struct StoreInner {
    records: BTreeMap<OpportunityId, Opportunity>,
    slots: HashMap<OpportunityId, Slot>,
    tokens: HashMap<MutationToken, OpportunityId>,
    next_token: u64,
}

impl StoreInner {
    fn issue_token(&mut self, id: &OpportunityId) -> MutationToken {
        self.next_token += 1;
        let token = MutationToken(self.next_token);
        self.tokens.insert(token, id.clone());
        token
    }

    fn is_busy(&self, id: &OpportunityId) -> bool {
        self.slots.get(id).is_some_and(Slot::is_busy)
    }

    /// Apply `mutation` to the working copy and mark it in flight.
    fn start(&mut self, token: MutationToken, mutation: &Mutation) -> Result<(), StoreError> {
        let id = &mutation.opportunity_id;
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownOpportunity(id.clone()))?;

        if let Some(expected) = &mutation.expected_stage {
            if &record.current_stage_id != expected {
                return Err(StoreError::Superseded {
                    opportunity_id: id.clone(),
                    expected: expected.clone(),
                    actual: record.current_stage_id.clone(),
                });
            }
        }

        let before = record.clone();
        mutation.patch.apply_to(record);
        self.slots.entry(id.clone()).or_default().in_flight = Some(InFlight { token, before });
        Ok(())
    }

    /// Take the in-flight entry for `token`, checking it is the one in flight.
    fn take_in_flight(
        &mut self,
        token: MutationToken,
    ) -> Result<(OpportunityId, InFlight), StoreError> {
        let id = self
            .tokens
            .get(&token)
            .cloned()
            .ok_or(StoreError::UnknownToken(token))?;

        let slot = self.slots.get_mut(&id);
        let matches = slot
            .as_ref()
            .and_then(|s| s.in_flight.as_ref())
            .is_some_and(|f| f.token == token);
        if !matches {
            return Err(StoreError::NotInFlight {
                opportunity_id: id,
                token,
            });
        }

        let in_flight = slot
            .and_then(|s| s.in_flight.take())
            .ok_or_else(|| StoreError::NotInFlight {
                opportunity_id: id.clone(),
                token,
            })?;
        self.tokens.remove(&token);
        Ok((id, in_flight))
    }

    fn take_deferred(&mut self, id: &OpportunityId) -> Vec<RemoteStageChange> {
        self.slots
            .get_mut(id)
            .map(|slot| std::mem::take(&mut slot.deferred))
            .unwrap_or_default()
    }

    /// Write a remote change into the record. Returns false for stale changes.
    fn apply_remote_now(&mut self, change: &RemoteStageChange) -> bool {
        let Some(record) = self.records.get_mut(&change.opportunity_id) else {
            return false;
        };
        if let Some(version) = change.version {
            if version <= record.version {
                return false;
            }
            record.version = version;
        }
        record.current_stage_id = change.new_stage_id.clone();
        true
    }

    /// Promote queued mutations for `id` until one is applied or the queue is empty.
    fn promote_next(&mut self, id: &OpportunityId) -> Option<MutationToken> {
        loop {
            let waiter = self.slots.get_mut(id)?.waiting.pop_front();
            let Some(Waiter {
                token,
                mutation,
                ready,
            }) = waiter
            else {
                if self.slots.get(id).is_some_and(|s| !s.is_busy() && s.deferred.is_empty()) {
                    self.slots.remove(id);
                }
                return None;
            };

            match self.start(token, &mutation) {
                Ok(()) => {
                    if ready.send(Ok(())).is_ok() {
                        return Some(token);
                    }
                    // Waiter went away; undo and try the next one.
                    debug!(%token, opportunity = %id, "queued mutation abandoned");
                    if let Ok((_, in_flight)) = self.take_in_flight(token) {
                        self.records.insert(id.clone(), in_flight.before);
                    }
                }
                Err(e) => {
                    debug!(%token, opportunity = %id, error = %e, "queued mutation refused");
                    self.tokens.remove(&token);
                    let _ = ready.send(Err(e));
                }
            }
        }
    }
}

/// Client working copy of opportunities with speculative, reversible mutations.
///
/// At most one mutation per opportunity is in flight; later ones queue and are
/// applied in submission order once the earlier one is committed or rolled
/// back. Mutations on different opportunities are independent.
pub struct OptimisticStore {
    inner: Mutex<StoreInner>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for OptimisticStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimisticStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(StoreInner::default()),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Subscribe to working-copy changes for re-rendering.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Load records fetched from the backend. Records with pending mutations
    /// keep their working copy.
    pub fn hydrate(&self, records: Vec<Opportunity>) {
        let count = {
            let mut inner = self.lock();
            let mut loaded = 0;
            for record in records {
                if inner.is_busy(&record.id) {
                    warn!(
                        opportunity = %record.id,
                        "skipping hydrate of record with pending mutation"
                    );
                    continue;
                }
                inner.records.insert(record.id.clone(), record);
                loaded += 1;
            }
            loaded
        };
        info!(count, "store hydrated");
        self.emit(StoreEvent::Hydrated { count });
    }

    /// Replace one record with a fresh server copy.
    ///
    /// Refused while a mutation on the record is pending, since its
    /// rollback memento would no longer match.
    pub fn refresh(&self, record: Opportunity) -> Result<(), StoreError> {
        let id = record.id.clone();
        {
            let mut inner = self.lock();
            if inner.is_busy(&id) {
                return Err(StoreError::Pending(id));
            }
            let slot = inner
                .records
                .get_mut(&id)
                .ok_or_else(|| StoreError::UnknownOpportunity(id.clone()))?;
            *slot = record;
        }
        debug!(opportunity = %id, "record refreshed");
        self.emit(StoreEvent::Refreshed(id));
        Ok(())
    }

    pub fn insert_created(&self, record: Opportunity) -> Result<(), StoreError> {
        let id = record.id.clone();
        {
            let mut inner = self.lock();
            if inner.records.contains_key(&id) {
                return Err(StoreError::DuplicateOpportunity(id));
            }
            inner.records.insert(id.clone(), record);
        }
        self.emit(StoreEvent::Inserted(id));
        Ok(())
    }

    pub fn get(&self, id: &OpportunityId) -> Option<Opportunity> {
        self.lock().records.get(id).cloned()
    }

    pub fn snapshot(&self) -> Vec<Opportunity> {
        self.lock().records.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a mutation on `id` is in flight or queued ("saving" state).
    pub fn is_pending(&self, id: &OpportunityId) -> bool {
        self.lock().is_busy(id)
    }

    /// Cards grouped by stage column in board order, oldest first.
    pub fn board(&self, graph: &StageGraph) -> Vec<BoardColumn> {
        let inner = self.lock();
        graph
            .all_stages()
            .map(|stage| {
                let mut cards: Vec<Opportunity> = inner
                    .records
                    .values()
                    .filter(|r| r.current_stage_id == stage.id)
                    .cloned()
                    .collect();
                cards.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
                BoardColumn {
                    stage: stage.clone(),
                    cards,
                }
            })
            .collect()
    }

    /// Apply a mutation speculatively, or queue it behind the one in flight.
    pub fn apply(&self, mutation: Mutation) -> Result<ApplyOutcome, StoreError> {
        let id = mutation.opportunity_id.clone();
        let mut inner = self.lock();
        if !inner.records.contains_key(&id) {
            return Err(StoreError::UnknownOpportunity(id));
        }

        let token = inner.issue_token(&id);
        if inner.is_busy(&id) {
            let (ready, receiver) = oneshot::channel();
            inner.slots.entry(id.clone()).or_default().waiting.push_back(Waiter {
                token,
                mutation,
                ready,
            });
            debug!(%token, opportunity = %id, "mutation queued");
            return Ok(ApplyOutcome::Queued {
                token,
                ready: receiver,
            });
        }

        if let Err(e) = inner.start(token, &mutation) {
            inner.tokens.remove(&token);
            return Err(e);
        }
        drop(inner);

        debug!(%token, opportunity = %id, "mutation applied");
        self.emit(StoreEvent::Applied {
            opportunity_id: id,
            token,
        });
        Ok(ApplyOutcome::Applied(token))
    }

    /// Apply a mutation, waiting for its turn if another one is in flight.
    pub async fn apply_in_order(&self, mutation: Mutation) -> Result<MutationToken, StoreError> {
        match self.apply(mutation)? {
            ApplyOutcome::Applied(token) => Ok(token),
            ApplyOutcome::Queued { token, ready } => {
                ready.await.map_err(|_| StoreError::Abandoned)??;
                Ok(token)
            }
        }
    }

    /// Replace the speculative record with the authoritative server record.
    pub fn commit(
        &self,
        token: MutationToken,
        server_record: Opportunity,
    ) -> Result<(), StoreError> {
        let (id, promoted) = {
            let mut inner = self.lock();
            let id = inner
                .tokens
                .get(&token)
                .cloned()
                .ok_or(StoreError::UnknownToken(token))?;
            if server_record.id != id {
                return Err(StoreError::RecordMismatch {
                    expected: id,
                    returned: server_record.id,
                });
            }

            inner.take_in_flight(token)?;
            let committed_version = server_record.version;
            inner.records.insert(id.clone(), server_record);

            for change in inner.take_deferred(&id) {
                if change.version.is_some_and(|v| v > committed_version) {
                    inner.apply_remote_now(&change);
                }
            }
            (id.clone(), inner.promote_next(&id))
        };

        debug!(%token, opportunity = %id, "mutation committed");
        self.emit(StoreEvent::Committed {
            opportunity_id: id.clone(),
            token,
        });
        self.emit_promoted(id, promoted);
        Ok(())
    }

    /// Restore the exact record captured when `token` was applied.
    pub fn rollback(&self, token: MutationToken) -> Result<(), StoreError> {
        let (id, promoted) = {
            let mut inner = self.lock();
            let (id, in_flight) = inner.take_in_flight(token)?;
            inner.records.insert(id.clone(), in_flight.before);

            for change in inner.take_deferred(&id) {
                inner.apply_remote_now(&change);
            }
            let promoted = inner.promote_next(&id);
            (id, promoted)
        };

        warn!(%token, opportunity = %id, "mutation rolled back");
        self.emit(StoreEvent::RolledBack {
            opportunity_id: id.clone(),
            token,
        });
        self.emit_promoted(id, promoted);
        Ok(())
    }

    fn emit_promoted(&self, id: OpportunityId, promoted: Option<MutationToken>) {
        if let Some(token) = promoted {
            debug!(%token, opportunity = %id, "queued mutation applied");
            self.emit(StoreEvent::Applied {
                opportunity_id: id,
                token,
            });
        }
    }

    /// Apply a stage change pushed by another session.
    ///
    /// Changes for a record with a pending mutation are deferred until it
    /// resolves. Returns whether the working copy changed now.
    pub fn apply_remote(&self, change: RemoteStageChange) -> Result<bool, StoreError> {
        let id = change.opportunity_id.clone();
        let applied = {
            let mut inner = self.lock();
            if !inner.records.contains_key(&id) {
                return Err(StoreError::UnknownOpportunity(id));
            }
            if inner.is_busy(&id) {
                debug!(opportunity = %id, "deferring remote change behind pending mutation");
                inner.slots.entry(id.clone()).or_default().deferred.push(change);
                return Ok(false);
            }
            inner.apply_remote_now(&change)
        };

        if applied {
            debug!(opportunity = %id, "remote change applied");
            self.emit(StoreEvent::RemoteApplied(id));
        }
        Ok(applied)
    }
}
