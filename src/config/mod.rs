//! Pipeline configuration
//!
//! Stages, stage requirements, terminal capture rules and engine tuning are
//! loaded once at startup from a TOML or YAML file and treated as immutable
//! for the rest of the session.

mod validation;


use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::coordinator::CommitPolicy;
use crate::graph::{GraphError, StageGraph};
use crate::models::constants::{
    DEFAULT_DRAG_ACTIVATION_DISTANCE, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BACKOFF_BASE_MS,
    DEFAULT_RETRY_BACKOFF_MAX_MS, PIPELINE_CONFIG_VERSION,
};
use crate::models::{Stage, TerminalKind};
use crate::requirements::{
    standard_requirements, FieldSpec, TerminalCaptureRule, TransitionValidator,
};

pub use validation::validate;

/// A configuration problem, optionally tied to one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub message: String,
    pub stage_id: Option<String>,
}

impl ConfigError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stage_id: None,
        }
    }

    pub(crate) fn for_stage(stage_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stage_id: Some(stage_id.into()),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(id) = &self.stage_id {
            write!(f, "Stage '{}': {}", id, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

/// Stage entry as written in a pipeline file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub id: String,
    /// Requirement lookup key; defaults to the id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub name: String,
    #[serde(default)]
    pub order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal: Option<TerminalKind>,
}

impl StageDefinition {
    pub fn key(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.id)
    }

    pub fn to_stage(&self) -> Stage {
        let mut stage = match self.terminal {
            Some(kind) => Stage::terminal(self.id.clone(), self.name.clone(), kind),
            None => Stage::new(self.id.clone(), self.name.clone(), self.order),
        }
        .with_key(self.key());
        stage.color_hint = self.color.clone();
        stage
    }

    fn active(id: &str, name: &str, order: u32, color: &str) -> Self {
        Self {
            id: id.to_string(),
            key: None,
            name: name.to_string(),
            order,
            color: Some(color.to_string()),
            terminal: None,
        }
    }

    fn closing(id: &str, name: &str, kind: TerminalKind, color: &str) -> Self {
        Self {
            terminal: Some(kind),
            ..Self::active(id, name, 0, color)
        }
    }
}

/// Engine tuning. Every field has a default, so the section may be omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Pointer travel in pixels before a press becomes a drag.
    pub drag_activation_distance: f64,
    /// Limit per persistence call; unset waits indefinitely.
    pub persistence_timeout_ms: Option<u64>,
    pub max_retries: u32,
    pub retry_backoff_base_ms: u64,
    pub retry_backoff_max_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            drag_activation_distance: DEFAULT_DRAG_ACTIVATION_DISTANCE,
            persistence_timeout_ms: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff_base_ms: DEFAULT_RETRY_BACKOFF_BASE_MS,
            retry_backoff_max_ms: DEFAULT_RETRY_BACKOFF_MAX_MS,
        }
    }
}

impl EngineConfig {
    pub fn commit_policy(&self) -> CommitPolicy {
        CommitPolicy {
            timeout: self.persistence_timeout_ms.map(Duration::from_millis),
            max_retries: self.max_retries,
            backoff_base: Duration::from_millis(self.retry_backoff_base_ms),
            backoff_max: Duration::from_millis(self.retry_backoff_max_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    pub stages: Vec<StageDefinition>,
    /// Stage key -> fields required before leaving that stage.
    #[serde(default)]
    pub requirements: BTreeMap<String, Vec<FieldSpec>>,
    /// Overrides for the Won/Lost capture rules.
    #[serde(default)]
    pub terminal: Vec<TerminalCaptureRule>,
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_version() -> u32 {
    PIPELINE_CONFIG_VERSION
}

impl Default for PipelineConfig {
    /// The standard sales pipeline: Lead, Qualify, Quote, Close, Won, Lost.
    fn default() -> Self {
        Self {
            version: PIPELINE_CONFIG_VERSION,
            stages: vec![
                StageDefinition::active("lead", "Lead", 0, "#64748b"),
                StageDefinition::active("qualify", "Qualify", 1, "#0ea5e9"),
                StageDefinition::active("quote", "Quote", 2, "#8b5cf6"),
                StageDefinition::active("close", "Close", 3, "#f59e0b"),
                StageDefinition::closing("won", "Won", TerminalKind::Won, "#22c55e"),
                StageDefinition::closing("lost", "Lost", TerminalKind::Lost, "#ef4444"),
            ],
            requirements: standard_requirements(),
            terminal: Vec::new(),
            engine: EngineConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse a pipeline file without validating it. The format follows the
    /// extension: `.toml`, `.yaml` or `.yml`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline config {}", path.display()))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display())),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display())),
            _ => bail!(
                "Unsupported pipeline config format: {} (expected .toml, .yaml or .yml)",
                path.display()
            ),
        }
    }

    /// Parse and validate a pipeline file.
    pub fn load(path: &Path) -> Result<Self> {
        let config = Self::from_file(path)?;
        if let Err(errors) = config.validate() {
            let details: Vec<String> = errors.iter().map(|e| format!("  - {e}")).collect();
            bail!(
                "Invalid pipeline config {}:\n{}",
                path.display(),
                details.join("\n")
            );
        }
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid TOML pipeline config")
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Invalid YAML pipeline config")
    }

    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        validate(self)
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.stages.iter().map(StageDefinition::to_stage).collect()
    }

    pub fn build_graph(&self) -> Result<StageGraph, GraphError> {
        StageGraph::new(self.stages())
    }

    pub fn build_validator(&self) -> TransitionValidator {
        TransitionValidator::new(self.requirements.clone(), self.terminal.clone())
    }
}
