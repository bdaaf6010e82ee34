//! Wiring of the engine for one board session.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::config::{EngineConfig, PipelineConfig};
use crate::coordinator::TransitionCoordinator;
use crate::drag::DragSession;
use crate::gateway::PersistenceGateway;
use crate::graph::StageGraph;
use crate::models::{Opportunity, OpportunityId};
use crate::requirements::TransitionValidator;
use crate::store::OptimisticStore;

/// Engine components sharing one stage graph, one store and one gateway.
pub struct Pipeline {
    engine: EngineConfig,
    coordinator: TransitionCoordinator,
}

impl Pipeline {
    /// Build the engine from static configuration.
    ///
    /// The stage list comes from the gateway; requirements and capture rules
    /// come from `config`. The working copy is hydrated from the gateway.
    pub async fn bootstrap(
        config: &PipelineConfig,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> Result<Self> {
        let stages = gateway
            .list_stages()
            .await
            .context("Failed to load stages from the backend")?;
        let graph = StageGraph::new(stages).context("Backend returned an invalid stage list")?;

        let last_active = graph.active_stages().last().map(|stage| stage.key.as_str());
        for (key, specs) in &config.requirements {
            if graph.stage_by_key(key).is_none() {
                bail!("Requirements reference stage key '{key}', unknown to the backend");
            }
            if last_active == Some(key.as_str()) && !specs.is_empty() {
                bail!("Requirements on '{key}' are never checked: it is the last active stage");
            }
        }

        let records = gateway
            .list_opportunities()
            .await
            .context("Failed to load opportunities from the backend")?;
        let store = Arc::new(OptimisticStore::new());
        store.hydrate(records);

        let coordinator = TransitionCoordinator::new(
            Arc::new(graph),
            Arc::new(config.build_validator()),
            store,
            gateway,
            config.engine.commit_policy(),
        );
        info!(
            stages = coordinator.graph().active_stages().len(),
            opportunities = coordinator.store().len(),
            "pipeline ready"
        );

        Ok(Self {
            engine: config.engine.clone(),
            coordinator,
        })
    }

    pub fn coordinator(&self) -> &TransitionCoordinator {
        &self.coordinator
    }

    pub fn graph(&self) -> &Arc<StageGraph> {
        self.coordinator.graph()
    }

    pub fn validator(&self) -> &Arc<TransitionValidator> {
        self.coordinator.validator()
    }

    pub fn store(&self) -> &Arc<OptimisticStore> {
        self.coordinator.store()
    }

    /// Reload one card from the backend, e.g. after a conflicting save.
    pub async fn refresh(&self, id: &OpportunityId) -> Result<Opportunity> {
        self.coordinator
            .refresh(id)
            .await
            .with_context(|| format!("Failed to refresh {id}"))
    }

    /// Fresh drag session using the configured activation distance.
    pub fn drag_session(&self) -> DragSession {
        DragSession::with_activation_distance(
            Arc::clone(self.graph()),
            self.engine.drag_activation_distance,
        )
    }
}
