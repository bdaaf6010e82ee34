use super::{GraphError, IllegalMove, Legality, StageGraph};
use crate::models::{Stage, StageId, TerminalKind, Trigger};

fn create_test_graph() -> StageGraph {
    StageGraph::new(vec![
        Stage::terminal("won", "Won", TerminalKind::Won),
        Stage::new("quote", "Quote", 2),
        Stage::new("lead", "Lead", 0),
        Stage::new("close", "Close", 3),
        Stage::new("qualify", "Qualify", 1),
        Stage::terminal("lost", "Lost", TerminalKind::Lost),
    ])
    .expect("valid graph")
}

fn id(s: &str) -> StageId {
    StageId::new(s)
}

const ACTIVE: [&str; 4] = ["lead", "qualify", "quote", "close"];

// =========================================================================
// Construction
// =========================================================================

#[test]
fn test_active_stages_sorted_by_order() {
    let graph = create_test_graph();
    let ids: Vec<_> = graph.active_stages().iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, ACTIVE);
    assert_eq!(graph.initial_stage().id, id("lead"));
    assert_eq!(graph.terminal_stages().len(), 2);
}

#[test]
fn test_rejects_gap_in_order() {
    let result = StageGraph::new(vec![Stage::new("a", "A", 0), Stage::new("b", "B", 2)]);
    assert_eq!(
        result.unwrap_err(),
        GraphError::NonContiguousOrder { found: vec![0, 2] }
    );
}

#[test]
fn test_rejects_duplicate_order() {
    let result = StageGraph::new(vec![Stage::new("a", "A", 0), Stage::new("b", "B", 0)]);
    assert!(matches!(
        result.unwrap_err(),
        GraphError::NonContiguousOrder { .. }
    ));
}

#[test]
fn test_rejects_duplicate_ids_and_terminals() {
    let dup = StageGraph::new(vec![Stage::new("a", "A", 0), Stage::new("a", "A2", 1)]);
    assert_eq!(dup.unwrap_err(), GraphError::DuplicateStage(id("a")));

    let two_won = StageGraph::new(vec![
        Stage::new("a", "A", 0),
        Stage::terminal("won", "Won", TerminalKind::Won),
        Stage::terminal("won-2", "Won again", TerminalKind::Won),
    ]);
    assert_eq!(
        two_won.unwrap_err(),
        GraphError::DuplicateTerminal(TerminalKind::Won)
    );
}

#[test]
fn test_rejects_terminal_only_pipeline() {
    let result = StageGraph::new(vec![Stage::terminal("won", "Won", TerminalKind::Won)]);
    assert_eq!(result.unwrap_err(), GraphError::NoActiveStages);
}

#[test]
fn test_next_stage_and_lookup() {
    let graph = create_test_graph();
    assert_eq!(graph.next_stage(&id("qualify")).unwrap().id, id("quote"));
    assert!(graph.next_stage(&id("close")).is_none());
    assert!(graph.next_stage(&id("won")).is_none());
    assert_eq!(graph.stage_by_key("quote").unwrap().name, "Quote");
    assert!(graph.terminal_stage(TerminalKind::Lost).unwrap().is_loss_stage());
}

// =========================================================================
// legality_of
// =========================================================================

#[test]
fn test_every_skip_is_classified_as_skip() {
    let graph = create_test_graph();
    for (a, from) in ACTIVE.iter().enumerate() {
        for (b, to) in ACTIVE.iter().enumerate() {
            let legality = graph.legality_of(&id(from), &id(to)).unwrap();
            if b > a + 1 {
                assert!(legality.is_skip(), "{from} -> {to} should be a skip");
            } else if b < a {
                assert_eq!(legality, Legality::Backward, "{from} -> {to}");
            }
        }
    }
}

#[test]
fn test_single_step_requires_validation() {
    let graph = create_test_graph();
    let legality = graph.legality_of(&id("lead"), &id("qualify")).unwrap();
    assert_eq!(legality, Legality::Forward { steps: 1 });
    assert!(legality.requires_validation());
    assert!(!Legality::Backward.requires_validation());
}

#[test]
fn test_terminal_and_reopen_classification() {
    let graph = create_test_graph();
    assert_eq!(
        graph.legality_of(&id("quote"), &id("won")).unwrap(),
        Legality::ToTerminal(TerminalKind::Won)
    );
    assert_eq!(
        graph.legality_of(&id("won"), &id("lost")).unwrap(),
        Legality::ToTerminal(TerminalKind::Lost)
    );
    assert_eq!(
        graph.legality_of(&id("lost"), &id("close")).unwrap(),
        Legality::Reopen
    );
    assert_eq!(
        graph.legality_of(&id("quote"), &id("quote")).unwrap(),
        Legality::SameStage
    );
}

#[test]
fn test_unknown_stage_is_an_error() {
    let graph = create_test_graph();
    assert_eq!(
        graph.legality_of(&id("lead"), &id("nowhere")).unwrap_err(),
        GraphError::UnknownStage(id("nowhere"))
    );
}

// =========================================================================
// admit
// =========================================================================

#[test]
fn test_admit_rejects_skip_for_every_trigger() {
    let graph = create_test_graph();
    for trigger in [Trigger::Drag, Trigger::Click, Trigger::ExplicitAction] {
        let err = graph.admit(&id("lead"), &id("quote"), trigger).unwrap_err();
        assert_eq!(
            err,
            IllegalMove::SkipsStages {
                from: id("lead"),
                to: id("quote"),
                steps: 2
            }
        );
    }
}

#[test]
fn test_admit_rejects_drag_onto_terminal() {
    let graph = create_test_graph();
    let err = graph.admit(&id("quote"), &id("won"), Trigger::Drag).unwrap_err();
    assert!(matches!(
        err,
        IllegalMove::TerminalRequiresExplicitAction {
            kind: TerminalKind::Won,
            ..
        }
    ));
    assert!(graph.admit(&id("quote"), &id("won"), Trigger::Click).is_err());
}

#[test]
fn test_admit_accepts_explicit_terminal_action() {
    let graph = create_test_graph();
    assert_eq!(
        graph
            .admit(&id("quote"), &id("lost"), Trigger::ExplicitAction)
            .unwrap(),
        Legality::ToTerminal(TerminalKind::Lost)
    );
}

#[test]
fn test_admit_accepts_backward_and_single_step() {
    let graph = create_test_graph();
    assert_eq!(
        graph.admit(&id("close"), &id("lead"), Trigger::Drag).unwrap(),
        Legality::Backward
    );
    assert_eq!(
        graph.admit(&id("qualify"), &id("quote"), Trigger::Click).unwrap(),
        Legality::Forward { steps: 1 }
    );
}

#[test]
fn test_admit_same_stage_and_unknown() {
    let graph = create_test_graph();
    assert_eq!(
        graph.admit(&id("lead"), &id("lead"), Trigger::Drag).unwrap_err(),
        IllegalMove::SameStage(id("lead"))
    );
    assert_eq!(
        graph.admit(&id("ghost"), &id("lead"), Trigger::Drag).unwrap_err(),
        IllegalMove::UnknownStage(id("ghost"))
    );
}
