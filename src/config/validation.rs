//! Pipeline config validation

use std::collections::HashSet;

use crate::models::constants::PIPELINE_CONFIG_VERSION;
use crate::models::TerminalKind;

use super::{ConfigError, PipelineConfig};

/// Validate a pipeline config, collecting every problem found.
pub fn validate(config: &PipelineConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.version != PIPELINE_CONFIG_VERSION {
        errors.push(ConfigError::new(format!(
            "Unsupported version: {}. Only version {} is supported.",
            config.version, PIPELINE_CONFIG_VERSION
        )));
    }

    if config.stages.is_empty() {
        errors.push(ConfigError::new("No stages defined"));
    }

    let mut ids = HashSet::new();
    let mut keys = HashSet::new();
    for stage in &config.stages {
        if stage.id.trim().is_empty() {
            errors.push(ConfigError::new("Stage ID cannot be empty"));
            continue;
        }
        if !ids.insert(stage.id.as_str()) {
            errors.push(ConfigError::for_stage(&stage.id, "Duplicate stage ID"));
        }
        if !keys.insert(stage.key()) {
            errors.push(ConfigError::for_stage(
                &stage.id,
                format!("Duplicate stage key '{}'", stage.key()),
            ));
        }
        if stage.name.trim().is_empty() {
            errors.push(ConfigError::for_stage(&stage.id, "Stage name cannot be empty"));
        }
    }

    // Active stages must be numbered 0..n without gaps or repeats
    let mut orders: Vec<u32> = config
        .stages
        .iter()
        .filter(|s| s.terminal.is_none())
        .map(|s| s.order)
        .collect();
    if orders.is_empty() && !config.stages.is_empty() {
        errors.push(ConfigError::new("At least one non-terminal stage is required"));
    }
    orders.sort_unstable();
    let contiguous = orders
        .iter()
        .enumerate()
        .all(|(idx, order)| *order as usize == idx);
    if !contiguous {
        errors.push(ConfigError::new(format!(
            "Stage orders must be unique and contiguous from 0, found {orders:?}"
        )));
    }

    for kind in [TerminalKind::Won, TerminalKind::Lost] {
        let count = config
            .stages
            .iter()
            .filter(|s| s.terminal == Some(kind))
            .count();
        if count > 1 {
            errors.push(ConfigError::new(format!("More than one {kind} stage defined")));
        }
    }

    let last_active = config
        .stages
        .iter()
        .filter(|s| s.terminal.is_none())
        .max_by_key(|s| s.order);

    for (key, specs) in &config.requirements {
        let Some(stage) = config.stages.iter().find(|s| s.key() == key) else {
            errors.push(ConfigError::new(format!(
                "Requirements reference unknown stage key '{key}'"
            )));
            continue;
        };
        if stage.terminal.is_some() && !specs.is_empty() {
            errors.push(ConfigError::for_stage(
                &stage.id,
                "Terminal stages cannot carry requirements",
            ));
        }
        if last_active.is_some_and(|last| last.id == stage.id) && !specs.is_empty() {
            errors.push(ConfigError::for_stage(
                &stage.id,
                "Last active stage is left only through Won or Lost and cannot carry requirements",
            ));
        }
        let mut fields = HashSet::new();
        for spec in specs {
            if !fields.insert(spec.field) {
                errors.push(ConfigError::for_stage(
                    &stage.id,
                    format!("Field '{}' listed more than once", spec.field),
                ));
            }
        }
    }

    let mut rule_kinds = HashSet::new();
    for rule in &config.terminal {
        if !rule_kinds.insert(rule.kind) {
            errors.push(ConfigError::new(format!(
                "Capture rule for {} defined more than once",
                rule.kind
            )));
        }
        if rule.accepted.is_empty() {
            errors.push(ConfigError::new(format!(
                "Capture rule for {} accepts no fields",
                rule.kind
            )));
        }
        for field in rule.accepted.iter().filter(|f| !f.is_text()) {
            errors.push(ConfigError::new(format!(
                "Capture rule for {} lists '{}', which is not a text field",
                rule.kind, field
            )));
        }
    }

    let engine = &config.engine;
    if !engine.drag_activation_distance.is_finite() || engine.drag_activation_distance < 0.0 {
        errors.push(ConfigError::new(format!(
            "engine.drag_activation_distance must be a non-negative number, got {}",
            engine.drag_activation_distance
        )));
    }
    if engine.persistence_timeout_ms == Some(0) {
        errors.push(ConfigError::new(
            "engine.persistence_timeout_ms must be greater than 0 (omit it to wait indefinitely)",
        ));
    }
    if engine.retry_backoff_base_ms > engine.retry_backoff_max_ms {
        errors.push(ConfigError::new(format!(
            "engine.retry_backoff_base_ms ({}) exceeds retry_backoff_max_ms ({})",
            engine.retry_backoff_base_ms, engine.retry_backoff_max_ms
        )));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
