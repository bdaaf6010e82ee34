//! `dealflow check <config> <from> <to>`: explain whether a move is allowed.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use super::resolve_stage;
use crate::config::PipelineConfig;
use crate::graph::{IllegalMove, Legality};
use crate::models::Trigger;
use crate::requirements::{FieldSpec, TerminalCaptureRule};

/// What the engine would do with a move, before looking at any record.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub legality: Result<Legality, IllegalMove>,
    /// Fields checked before the move commits (single forward step only).
    pub requirements: Vec<FieldSpec>,
    /// Closing value demanded by a Won/Lost move.
    pub capture: Option<TerminalCaptureRule>,
}

pub fn evaluate(
    config: &PipelineConfig,
    from: &str,
    to: &str,
    trigger: Trigger,
) -> Result<Verdict> {
    let graph = config.build_graph().context("Invalid stage list")?;
    let validator = config.build_validator();
    let from = resolve_stage(&graph, from)?;
    let to = resolve_stage(&graph, to)?;

    let legality = graph.admit(&from, &to, trigger);
    let mut verdict = Verdict {
        legality: legality.clone(),
        requirements: Vec::new(),
        capture: None,
    };
    match legality {
        Ok(Legality::Forward { .. }) => {
            if let Some(stage) = graph.stage(&from) {
                verdict.requirements = validator.requirements_for(&stage.key).to_vec();
            }
        }
        Ok(Legality::ToTerminal(kind)) => {
            verdict.capture = Some(validator.capture_rule(kind).clone());
        }
        _ => {}
    }
    Ok(verdict)
}

pub fn execute(path: &Path, from: &str, to: &str, trigger: Trigger) -> Result<()> {
    let config = PipelineConfig::load(path)?;
    let verdict = evaluate(&config, from, to, trigger)?;

    match &verdict.legality {
        Err(reason) => {
            println!("{} {} -> {} ({}): {}", "✗".red().bold(), from, to, trigger, reason);
        }
        Ok(legality) => {
            println!("{} {} -> {} ({}): {}", "✓".green().bold(), from, to, trigger, legality);
            if !verdict.requirements.is_empty() {
                println!("  {}", "Needs before commit:".bold());
                for spec in verdict.requirements.iter().filter(|s| s.required) {
                    println!("    - {} ({})", spec.field.label(), spec.field);
                }
            } else if legality.is_single_step() {
                println!("  {}", "No requirements on the origin stage".dimmed());
            }
            if let Some(rule) = &verdict.capture {
                let accepted: Vec<&str> = rule.accepted.iter().map(|f| f.label()).collect();
                println!("  {} {}", "Captures one of:".bold(), accepted.join(", "));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldName, TerminalKind};

    #[test]
    fn test_single_step_lists_origin_requirements() {
        let config = PipelineConfig::default();
        let verdict = evaluate(&config, "lead", "qualify", Trigger::Drag).unwrap();

        assert_eq!(verdict.legality, Ok(Legality::Forward { steps: 1 }));
        let fields: Vec<FieldName> = verdict.requirements.iter().map(|s| s.field).collect();
        assert_eq!(
            fields,
            vec![FieldName::Contact, FieldName::Products, FieldName::LeadOrigin]
        );
    }

    #[test]
    fn test_skip_is_illegal() {
        let config = PipelineConfig::default();
        let verdict = evaluate(&config, "lead", "close", Trigger::Click).unwrap();
        assert!(matches!(
            verdict.legality,
            Err(IllegalMove::SkipsStages { steps: 3, .. })
        ));
        assert!(verdict.requirements.is_empty());
    }

    #[test]
    fn test_explicit_terminal_shows_capture() {
        let verdict =
            evaluate(&PipelineConfig::default(), "quote", "lost", Trigger::ExplicitAction).unwrap();

        assert_eq!(verdict.legality, Ok(Legality::ToTerminal(TerminalKind::Lost)));
        assert_eq!(verdict.capture.unwrap().accepted, vec![FieldName::LostReason]);
    }

    #[test]
    fn test_unknown_stage_is_an_error() {
        let config = PipelineConfig::default();
        let err = evaluate(&config, "lead", "nowhere", Trigger::Drag).unwrap_err();
        assert!(err.to_string().contains("nowhere"));
    }
}
