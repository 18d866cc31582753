use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DiagramStore, ThreatModelStore};
use crate::error::StoreError;
use crate::models::{DiagramSnapshot, ThreatModel};

/// In-memory store backing the test suites
#[derive(Default)]
pub struct MemoryStore {
    diagrams: RwLock<HashMap<Uuid, DiagramSnapshot>>,
    threat_models: RwLock<HashMap<Uuid, ThreatModel>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_threat_model(&self, threat_model: ThreatModel) {
        self.threat_models
            .write()
            .await
            .insert(threat_model.id, threat_model);
    }
}

#[async_trait]
impl DiagramStore for MemoryStore {
    async fn get(&self, diagram_id: Uuid) -> Result<Option<DiagramSnapshot>, StoreError> {
        Ok(self.diagrams.read().await.get(&diagram_id).cloned())
    }

    async fn create(&self, diagram: &DiagramSnapshot) -> Result<(), StoreError> {
        self.diagrams.write().await.insert(diagram.id, diagram.clone());
        if let Some(tm) = self
            .threat_models
            .write()
            .await
            .get_mut(&diagram.threat_model_id)
        {
            if !tm.diagram_ids.contains(&diagram.id) {
                tm.diagram_ids.push(diagram.id);
            }
        }
        Ok(())
    }

    async fn update(&self, diagram: &DiagramSnapshot) -> Result<(), StoreError> {
        let mut diagrams = self.diagrams.write().await;
        match diagrams.get_mut(&diagram.id) {
            Some(stored) => {
                *stored = diagram.clone();
                Ok(())
            }
            None => Err(StoreError::DiagramNotFound(diagram.id)),
        }
    }

    async fn delete(&self, diagram_id: Uuid) -> Result<bool, StoreError> {
        let removed = self.diagrams.write().await.remove(&diagram_id);
        if let Some(diagram) = &removed {
            if let Some(tm) = self
                .threat_models
                .write()
                .await
                .get_mut(&diagram.threat_model_id)
            {
                tm.diagram_ids.retain(|id| *id != diagram_id);
            }
        }
        Ok(removed.is_some())
    }
}

#[async_trait]
impl ThreatModelStore for MemoryStore {
    async fn get(&self, threat_model_id: Uuid) -> Result<Option<ThreatModel>, StoreError> {
        Ok(self.threat_models.read().await.get(&threat_model_id).cloned())
    }
}
