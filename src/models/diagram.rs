use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// One node or edge of a diagram. Everything besides the id is opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Cell {
    pub id: Uuid,
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl Cell {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            data: serde_json::Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: serde_json::Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }
}

/// The persisted diagram graph plus its logical clock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DiagramSnapshot {
    pub id: Uuid,
    pub threat_model_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub cells: Vec<Cell>,
    /// Incremented exactly once per write that changes `cells`
    pub update_vector: i64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl DiagramSnapshot {
    pub fn new(threat_model_id: Uuid, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            threat_model_id,
            name: name.into(),
            description: None,
            cells: Vec::new(),
            update_vector: 0,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn cell(&self, id: Uuid) -> Option<&Cell> {
        self.cells.iter().find(|cell| cell.id == id)
    }
}

/// Body of `POST .../diagrams`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateDiagramRequest {
    pub name: String,
    pub description: Option<String>,
}

/// Body of `PUT .../diagrams/{id}`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateDiagramRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub cells: Vec<Cell>,
}

/// Body of `PATCH .../diagrams/{id}`, absent fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PatchDiagramRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub cells: Option<Vec<Cell>>,
}
