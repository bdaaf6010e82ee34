use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;

use super::retry::{calculate_backoff, should_retry};
use super::{
    CommitPolicy, TransitionCoordinator, TransitionError, TransitionEvent, TransitionOutcome,
};
use crate::drag::{DragOrigin, DragPhase, DragSession, DropTarget, Point};
use crate::gateway::{GatewayCall, GatewayError, MemoryGateway};
use crate::graph::{IllegalMove, StageGraph};
use crate::models::{
    FieldName, FieldPatch, Opportunity, OpportunityId, Stage, StageId, TerminalKind,
    TransitionRequest, Trigger,
};
use crate::requirements::TransitionValidator;
use crate::store::OptimisticStore;

fn create_test_stages() -> Vec<Stage> {
    vec![
        Stage::new("lead", "Lead", 0),
        Stage::new("qualify", "Qualify", 1),
        Stage::new("quote", "Quote", 2),
        Stage::new("close", "Close", 3),
        Stage::terminal("won", "Won", TerminalKind::Won),
        Stage::terminal("lost", "Lost", TerminalKind::Lost),
    ]
}

struct Harness {
    coordinator: TransitionCoordinator,
    gateway: Arc<MemoryGateway>,
    store: Arc<OptimisticStore>,
}

fn create_test_harness(records: Vec<Opportunity>, policy: CommitPolicy) -> Harness {
    let graph = Arc::new(StageGraph::new(create_test_stages()).unwrap());
    let gateway = Arc::new(MemoryGateway::new(create_test_stages()));
    let store = Arc::new(OptimisticStore::new());
    for record in &records {
        gateway.insert(record.clone());
    }
    store.hydrate(records);

    let coordinator = TransitionCoordinator::new(
        graph,
        Arc::new(TransitionValidator::standard()),
        Arc::clone(&store),
        gateway.clone(),
        policy,
    );
    Harness {
        coordinator,
        gateway,
        store,
    }
}

/// Record with every requirement of every active stage filled in.
fn create_complete_opportunity(stage: &str) -> Opportunity {
    let mut record = Opportunity::new("Fleet renewal", StageId::new(stage)).with_id("opp-1");
    FieldPatch::new()
        .with_contact("contact-1", Some("company-1".to_string()))
        .with_products(["prod-1"])
        .with_lead_origin("referral")
        .with_type_of_sale("direct")
        .with_prices(1000.0, 1200.0)
        .with_expected_close_date(NaiveDate::from_ymd_opt(2026, 12, 1).unwrap())
        .apply_to(&mut record);
    record.version = 1;
    record
}

fn create_empty_opportunity(stage: &str) -> Opportunity {
    let mut record = Opportunity::new("Fleet renewal", StageId::new(stage)).with_id("opp-1");
    record.version = 1;
    record
}

fn id() -> OpportunityId {
    OpportunityId::new("opp-1")
}

fn request(from: &str, to: &str, trigger: Trigger) -> TransitionRequest {
    TransitionRequest::new(id(), StageId::new(from), StageId::new(to), trigger)
}

fn stage_of(store: &OptimisticStore) -> StageId {
    store.get(&id()).unwrap().current_stage_id
}

// ============================================================================
// Retry helpers
// ============================================================================

#[test]
fn test_should_retry_only_transient_errors() {
    let network = GatewayError::Network("reset".into());
    let conflict = GatewayError::Conflict {
        expected: 1,
        actual: 2,
    };

    assert!(should_retry(&network, 0, 2));
    assert!(should_retry(&GatewayError::Timeout, 1, 2));
    assert!(!should_retry(&network, 2, 2));
    assert!(!should_retry(&conflict, 0, 5));
    assert!(!should_retry(&network, 0, 0));
}

#[test]
fn test_calculate_backoff() {
    let base = Duration::from_millis(250);
    let max = Duration::from_secs(4);

    assert_eq!(calculate_backoff(0, base, max), Duration::ZERO);
    assert_eq!(calculate_backoff(1, base, max), Duration::from_millis(250));
    assert_eq!(calculate_backoff(2, base, max), Duration::from_millis(500));
    assert_eq!(calculate_backoff(3, base, max), Duration::from_secs(1));
    assert_eq!(calculate_backoff(6, base, max), Duration::from_secs(4));
    assert_eq!(calculate_backoff(40, base, max), Duration::from_secs(4));
}

// ============================================================================
// Legality and validation
// ============================================================================

#[tokio::test]
async fn test_backward_move_commits_without_validation() {
    let h = create_test_harness(vec![create_empty_opportunity("close")], CommitPolicy::default());

    let outcome = h
        .coordinator
        .request(request("close", "lead", Trigger::Drag))
        .await
        .unwrap();

    let record = outcome.committed().unwrap();
    assert_eq!(record.current_stage_id, StageId::new("lead"));
    assert_eq!(record.version, 2);
    assert_eq!(stage_of(&h.store), StageId::new("lead"));
    assert!(matches!(
        h.gateway.calls().as_slice(),
        [GatewayCall::MoveStage { .. }]
    ));
}

#[tokio::test]
async fn test_skip_move_is_rejected_without_persistence() {
    let h = create_test_harness(vec![create_complete_opportunity("lead")], CommitPolicy::default());
    let mut events = h.coordinator.subscribe();

    let outcome = h
        .coordinator
        .request(request("lead", "quote", Trigger::Click))
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        TransitionOutcome::Rejected(IllegalMove::SkipsStages { steps: 2, .. })
    ));
    assert!(h.gateway.calls().is_empty());
    assert!(matches!(
        events.try_recv().unwrap(),
        TransitionEvent::Rejected { .. }
    ));
}

#[tokio::test]
async fn test_incomplete_forward_move_requests_gap_fill() {
    let h = create_test_harness(vec![create_empty_opportunity("lead")], CommitPolicy::default());

    let outcome = h
        .coordinator
        .request(request("lead", "qualify", Trigger::Drag))
        .await
        .unwrap();

    let TransitionOutcome::AwaitingGapFill(gap) = outcome else {
        panic!("expected gap fill, got {outcome:?}");
    };
    assert_eq!(gap.stage_key, "lead");
    assert_eq!(
        gap.fields(),
        vec![FieldName::Contact, FieldName::Products, FieldName::LeadOrigin]
    );
    // Nothing speculative is left on the card.
    assert_eq!(stage_of(&h.store), StageId::new("lead"));
    assert!(!h.store.is_pending(&id()));
    assert!(h.gateway.calls().is_empty());
}

#[tokio::test]
async fn test_partial_gap_fill_asks_again() {
    let h = create_test_harness(vec![create_empty_opportunity("lead")], CommitPolicy::default());
    let TransitionOutcome::AwaitingGapFill(gap) = h
        .coordinator
        .request(request("lead", "qualify", Trigger::Drag))
        .await
        .unwrap()
    else {
        panic!("expected gap fill");
    };

    let outcome = h
        .coordinator
        .submit_gap_fill(gap, FieldPatch::new().with_contact("contact-1", None))
        .await
        .unwrap();

    let TransitionOutcome::AwaitingGapFill(again) = outcome else {
        panic!("expected another gap fill");
    };
    assert_eq!(again.fields(), vec![FieldName::Products, FieldName::LeadOrigin]);
    assert!(h.gateway.calls().is_empty());
}

#[tokio::test]
async fn test_gap_fill_commits_fields_and_stage_together() {
    let h = create_test_harness(vec![create_empty_opportunity("lead")], CommitPolicy::default());
    let TransitionOutcome::AwaitingGapFill(gap) = h
        .coordinator
        .request(request("lead", "qualify", Trigger::Drag))
        .await
        .unwrap()
    else {
        panic!("expected gap fill");
    };

    let values = FieldPatch::new()
        .with_contact("contact-1", None)
        .with_products(["prod-1"])
        .with_lead_origin("trade-show");
    let outcome = h.coordinator.submit_gap_fill(gap, values).await.unwrap();

    let record = outcome.committed().unwrap();
    assert_eq!(record.current_stage_id, StageId::new("qualify"));
    assert_eq!(record.lead_origin.as_deref(), Some("trade-show"));
    let calls = h.gateway.calls();
    assert_eq!(calls.len(), 1);
    let GatewayCall::UpdateFields { patch, .. } = &calls[0] else {
        panic!("expected a combined update, got {:?}", calls[0]);
    };
    assert_eq!(patch.stage, Some(StageId::new("qualify")));
}

#[tokio::test]
async fn test_cancel_gap_fill_leaves_record_untouched() {
    let h = create_test_harness(vec![create_empty_opportunity("lead")], CommitPolicy::default());
    let before = h.store.get(&id()).unwrap();
    let mut events = h.coordinator.subscribe();
    let TransitionOutcome::AwaitingGapFill(gap) = h
        .coordinator
        .request(request("lead", "qualify", Trigger::Drag))
        .await
        .unwrap()
    else {
        panic!("expected gap fill");
    };

    let outcome = h.coordinator.cancel(gap.request);

    assert_eq!(outcome, TransitionOutcome::Cancelled);
    assert_eq!(h.store.get(&id()).unwrap(), before);
    assert!(matches!(
        events.try_recv().unwrap(),
        TransitionEvent::GapFillRequested(_)
    ));
    assert!(matches!(
        events.try_recv().unwrap(),
        TransitionEvent::Cancelled { .. }
    ));
}

#[tokio::test]
async fn test_stale_request_is_refused() {
    let h = create_test_harness(
        vec![create_complete_opportunity("quote")],
        CommitPolicy::default(),
    );

    let err = h
        .coordinator
        .request(request("lead", "qualify", Trigger::Drag))
        .await
        .unwrap_err();

    assert!(matches!(err, TransitionError::StaleRequest { .. }));
}

// ============================================================================
// Terminal stages
// ============================================================================

#[tokio::test]
async fn test_drag_to_won_is_rejected() {
    let h = create_test_harness(
        vec![create_complete_opportunity("quote")],
        CommitPolicy::default(),
    );

    let outcome = h
        .coordinator
        .request(request("quote", "won", Trigger::Drag))
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        TransitionOutcome::Rejected(IllegalMove::TerminalRequiresExplicitAction { .. })
    ));
    assert_eq!(stage_of(&h.store), StageId::new("quote"));
}

#[tokio::test]
async fn test_explicit_won_requires_capture() {
    let h = create_test_harness(
        vec![create_complete_opportunity("close")],
        CommitPolicy::default(),
    );

    let outcome = h
        .coordinator
        .move_to_stage(&id(), &StageId::new("won"), Trigger::ExplicitAction)
        .await
        .unwrap();

    let TransitionOutcome::AwaitingTerminalCapture(capture) = outcome else {
        panic!("expected terminal capture, got {outcome:?}");
    };
    assert_eq!(capture.kind, TerminalKind::Won);

    let wrong = h
        .coordinator
        .submit_terminal_capture(capture.clone(), FieldName::LostReason, "price")
        .await
        .unwrap_err();
    assert!(matches!(wrong, TransitionError::InvalidCapture { .. }));

    let blank = h
        .coordinator
        .submit_terminal_capture(capture.clone(), FieldName::WonDocumentRef, "  ")
        .await
        .unwrap_err();
    assert!(matches!(blank, TransitionError::EmptyCapture(FieldName::WonDocumentRef)));

    let done = h
        .coordinator
        .submit_terminal_capture(capture, FieldName::WonDocumentRef, "PO-4471")
        .await
        .unwrap();
    let record = done.committed().unwrap();
    assert_eq!(record.current_stage_id, StageId::new("won"));
    assert_eq!(record.won_document_ref.as_deref(), Some("PO-4471"));
}

#[tokio::test]
async fn test_won_from_close_asks_only_for_the_capture() {
    let h = create_test_harness(vec![create_empty_opportunity("close")], CommitPolicy::default());

    let outcome = h
        .coordinator
        .move_to_stage(&id(), &StageId::new("won"), Trigger::ExplicitAction)
        .await
        .unwrap();
    let TransitionOutcome::AwaitingTerminalCapture(capture) = outcome else {
        panic!("expected terminal capture, got {outcome:?}");
    };

    let done = h
        .coordinator
        .submit_terminal_capture(capture, FieldName::WonDocumentRef, "PO-1")
        .await
        .unwrap();

    let record = done.committed().unwrap();
    assert_eq!(record.current_stage_id, StageId::new("won"));
    assert_eq!(record.expected_close_date, None);
    assert_eq!(h.gateway.calls().len(), 1);
}

#[tokio::test]
async fn test_reopen_from_lost_needs_no_validation() {
    let mut record = create_empty_opportunity("lost");
    record.lost_reason = Some("budget".to_string());
    let h = create_test_harness(vec![record], CommitPolicy::default());

    let outcome = h
        .coordinator
        .request(request("lost", "quote", Trigger::Click))
        .await
        .unwrap();

    assert!(outcome.is_committed());
    assert_eq!(stage_of(&h.store), StageId::new("quote"));
}

// ============================================================================
// Persistence failures
// ============================================================================

#[tokio::test]
async fn test_failed_move_rolls_back() {
    let h = create_test_harness(
        vec![create_complete_opportunity("qualify")],
        CommitPolicy::default(),
    );
    let before = h.store.get(&id()).unwrap();
    h.gateway.fail_next(GatewayError::Network("offline".into()));
    let mut events = h.coordinator.subscribe();

    let err = h
        .coordinator
        .request(request("qualify", "quote", Trigger::Drag))
        .await
        .unwrap_err();

    assert!(matches!(err, TransitionError::Persistence { .. }));
    assert!(err.is_retryable());
    assert_eq!(h.store.get(&id()).unwrap(), before);
    assert!(!h.store.is_pending(&id()));
    assert!(matches!(
        events.try_recv().unwrap(),
        TransitionEvent::RolledBack { .. }
    ));

    // The user retries the same transition.
    let retried = h
        .coordinator
        .request(request("qualify", "quote", Trigger::Drag))
        .await
        .unwrap();
    assert!(retried.is_committed());
}

#[tokio::test]
async fn test_conflict_is_not_retried() {
    let policy = CommitPolicy {
        max_retries: 3,
        ..CommitPolicy::default()
    };
    let h = create_test_harness(vec![create_complete_opportunity("qualify")], policy);
    h.gateway.touch_remotely(&id(), &StageId::new("qualify"));

    let err = h
        .coordinator
        .request(request("qualify", "quote", Trigger::Drag))
        .await
        .unwrap_err();

    assert!(matches!(err, TransitionError::Conflict { .. }));
    assert!(!err.is_retryable());
    assert_eq!(h.gateway.calls().len(), 1);
    assert_eq!(stage_of(&h.store), StageId::new("qualify"));
}

#[tokio::test]
async fn test_refresh_after_conflict_lets_retry_succeed() {
    let h = create_test_harness(
        vec![create_complete_opportunity("qualify")],
        CommitPolicy::default(),
    );
    let remote = h.gateway.touch_remotely(&id(), &StageId::new("qualify")).unwrap();

    for _ in 0..2 {
        let err = h
            .coordinator
            .move_to_stage(&id(), &StageId::new("lead"), Trigger::Click)
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::Conflict { .. }));
    }

    let refreshed = h.coordinator.refresh(&id()).await.unwrap();
    assert_eq!(refreshed, remote);
    assert_eq!(h.store.get(&id()).unwrap().version, 2);

    let outcome = h
        .coordinator
        .move_to_stage(&id(), &StageId::new("lead"), Trigger::Click)
        .await
        .unwrap();
    let record = outcome.committed().unwrap();
    assert_eq!(record.current_stage_id, StageId::new("lead"));
    assert_eq!(record.version, 3);
}

#[tokio::test]
async fn test_refresh_unknown_record_is_a_persistence_error() {
    let h = create_test_harness(Vec::new(), CommitPolicy::default());

    let err = h
        .coordinator
        .refresh(&OpportunityId::new("opp-404"))
        .await
        .unwrap_err();

    let TransitionError::Persistence { source, .. } = err else {
        panic!("expected persistence failure, got {err:?}");
    };
    assert_eq!(source, GatewayError::NotFound(OpportunityId::new("opp-404")));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_is_retried_with_backoff() {
    let policy = CommitPolicy {
        max_retries: 2,
        ..CommitPolicy::default()
    };
    let h = create_test_harness(vec![create_complete_opportunity("qualify")], policy);
    h.gateway.fail_next(GatewayError::Network("reset".into()));

    let outcome = h
        .coordinator
        .request(request("qualify", "quote", Trigger::Drag))
        .await
        .unwrap();

    assert!(outcome.is_committed());
    assert_eq!(h.gateway.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_rolls_back() {
    let policy = CommitPolicy {
        timeout: Some(Duration::from_millis(100)),
        ..CommitPolicy::default()
    };
    let h = create_test_harness(vec![create_complete_opportunity("qualify")], policy);
    let _release = h.gateway.hold_next();

    let err = h
        .coordinator
        .request(request("qualify", "quote", Trigger::Drag))
        .await
        .unwrap_err();

    let TransitionError::Persistence { source, .. } = err else {
        panic!("expected persistence failure, got {err:?}");
    };
    assert_eq!(source, GatewayError::Timeout);
    assert_eq!(stage_of(&h.store), StageId::new("qualify"));
}

// ============================================================================
// Entry points
// ============================================================================

#[tokio::test]
async fn test_handle_drop_returns_session_to_idle() {
    let h = create_test_harness(vec![create_complete_opportunity("lead")], CommitPolicy::default());
    let mut session = DragSession::new(Arc::clone(h.coordinator.graph()));
    session
        .pointer_down(
            DragOrigin {
                opportunity_id: id(),
                stage_id: StageId::new("lead"),
                index: 0,
            },
            Point::new(0.0, 0.0),
        )
        .unwrap();
    let target = Some(DropTarget::new(StageId::new("qualify"), 0));
    session.pointer_move(Point::new(50.0, 0.0), target.clone());
    let Some(crate::drag::DragEvent::Dropped(dropped)) = session.pointer_up(target) else {
        panic!("expected a drop");
    };

    let outcome = h.coordinator.handle_drop(&mut session, dropped).await.unwrap();

    assert!(outcome.is_committed());
    assert_eq!(session.phase(), DragPhase::Idle);
}

#[tokio::test]
async fn test_handle_drop_keeps_committed_outcome_for_idle_session() {
    let h = create_test_harness(vec![create_empty_opportunity("close")], CommitPolicy::default());
    let mut session = DragSession::new(Arc::clone(h.coordinator.graph()));

    let outcome = h
        .coordinator
        .handle_drop(&mut session, request("close", "lead", Trigger::Drag))
        .await
        .unwrap();

    assert_eq!(outcome.committed().unwrap().current_stage_id, StageId::new("lead"));
    assert_eq!(stage_of(&h.store), StageId::new("lead"));
    assert_eq!(session.phase(), DragPhase::Idle);
}

#[tokio::test]
async fn test_same_stage_request_is_rejected() {
    let h = create_test_harness(vec![create_empty_opportunity("quote")], CommitPolicy::default());
    let mut events = h.coordinator.subscribe();

    let outcome = h
        .coordinator
        .request(request("quote", "quote", Trigger::Click))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        TransitionOutcome::Rejected(IllegalMove::SameStage(StageId::new("quote")))
    );
    assert!(matches!(
        events.try_recv().unwrap(),
        TransitionEvent::Rejected { .. }
    ));
    assert!(h.gateway.calls().is_empty());
}

#[tokio::test]
async fn test_create_opportunity_lands_in_initial_stage() {
    let h = create_test_harness(Vec::new(), CommitPolicy::default());

    let created = h.coordinator.create_opportunity("New deal").await.unwrap();

    assert_eq!(created.current_stage_id, StageId::new("lead"));
    assert_eq!(h.store.get(&created.id).unwrap(), created);
    assert!(h.gateway.record(&created.id).is_some());
}
