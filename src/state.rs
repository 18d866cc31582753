use std::sync::Arc;

use crate::colab::{SessionRegistry, UpdatePipeline};
use crate::config::Config;
use crate::db::{DiagramStore, MemoryStore, ThreatModelStore};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: SessionRegistry,
    pub pipeline: UpdatePipeline,
    pub diagrams: Arc<dyn DiagramStore>,
    pub threat_models: Arc<dyn ThreatModelStore>,
}

impl AppState {
    pub fn new(config: Config, diagrams: Arc<dyn DiagramStore>, threat_models: Arc<dyn ThreatModelStore>) -> Self {
        let registry = SessionRegistry::new();
        let pipeline = UpdatePipeline::new(
            Arc::clone(&diagrams),
            registry.clone(),
            config.pipeline_worker_idle(),
        );
        Self {
            config: Arc::new(config),
            registry,
            pipeline,
            diagrams,
            threat_models,
        }
    }

    /// State backed by one process-local store
    pub fn in_memory(config: Config, store: Arc<MemoryStore>) -> Self {
        Self::new(config, store.clone(), store)
    }
}
