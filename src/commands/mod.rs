pub mod check;
pub mod stages;
pub mod validate;

use anyhow::{Context, Result};

use crate::graph::StageGraph;
use crate::models::StageId;

/// Resolve a stage given on the command line by id or by key.
pub(crate) fn resolve_stage(graph: &StageGraph, name: &str) -> Result<StageId> {
    graph
        .stage(&StageId::new(name))
        .or_else(|| graph.stage_by_key(name))
        .map(|stage| stage.id.clone())
        .with_context(|| format!("Unknown stage '{name}'"))
}
