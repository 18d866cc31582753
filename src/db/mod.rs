//! Persistence collaborators consumed by the collaboration core.
//!
//! Implementations:
//! - `MemoryStore` - process-local, used by tests
//! - `PgStore` - PostgreSQL via sqlx

pub mod memory;
pub mod pgstore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{DiagramSnapshot, ThreatModel};

pub use memory::MemoryStore;
pub use pgstore::PgStore;

/// Diagram persistence, keyed by diagram id.
#[async_trait]
pub trait DiagramStore: Send + Sync {
    async fn get(&self, diagram_id: Uuid) -> Result<Option<DiagramSnapshot>, StoreError>;

    /// Insert a new diagram and link it to its threat model
    async fn create(&self, diagram: &DiagramSnapshot) -> Result<(), StoreError>;

    /// Replace the stored diagram in one atomic write
    async fn update(&self, diagram: &DiagramSnapshot) -> Result<(), StoreError>;

    /// Returns false when nothing was deleted
    async fn delete(&self, diagram_id: Uuid) -> Result<bool, StoreError>;
}

/// Parent-resource lookup for existence and role checks.
#[async_trait]
pub trait ThreatModelStore: Send + Sync {
    async fn get(&self, threat_model_id: Uuid) -> Result<Option<ThreatModel>, StoreError>;
}
