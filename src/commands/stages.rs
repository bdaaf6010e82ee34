//! `dealflow stages <config>`: the ordered board and what each stage requires.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::json;

use crate::config::PipelineConfig;
use crate::models::TerminalKind;
use crate::requirements::FieldSpec;

fn describe(specs: &[FieldSpec]) -> String {
    specs
        .iter()
        .filter(|spec| spec.required)
        .map(|spec| spec.field.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn execute(path: &Path, as_json: bool) -> Result<()> {
    let config = PipelineConfig::load(path)?;
    let graph = config.build_graph().context("Invalid stage list")?;
    let validator = config.build_validator();

    if as_json {
        let stages: Vec<_> = graph
            .all_stages()
            .map(|stage| {
                json!({
                    "stage": stage,
                    "requirements": validator.requirements_for(&stage.key),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&stages)?);
        return Ok(());
    }

    println!("{}", "Pipeline".bold());
    for stage in graph.active_stages() {
        let requires = describe(validator.requirements_for(&stage.key));
        let requires = if requires.is_empty() {
            "no requirements".dimmed().to_string()
        } else {
            format!("requires {requires}")
        };
        println!(
            "  {:>2}  {:<16} {}",
            stage.order_index,
            stage.name.bold(),
            requires
        );
    }

    for stage in graph.terminal_stages() {
        let Some(kind) = stage.terminal else { continue };
        let marker = match kind {
            TerminalKind::Won => "◆".green().bold(),
            TerminalKind::Lost => "◆".red().bold(),
        };
        let accepted: Vec<String> = validator
            .capture_rule(kind)
            .accepted
            .iter()
            .map(ToString::to_string)
            .collect();
        println!(
            "  {}  {:<16} explicit action, captures {}",
            marker,
            stage.name.bold(),
            accepted.join(" | ")
        );
    }
    Ok(())
}
