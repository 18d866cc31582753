use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A live participant as shown to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ParticipantView {
    pub user_id: String,
    pub joined_at: DateTime<Utc>,
}

/// Response body of the collaborate endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CollaborationSessionView {
    pub session_id: Uuid,
    pub threat_model_id: Uuid,
    pub diagram_id: Uuid,
    pub participants: Vec<ParticipantView>,
    pub websocket_url: String,
}
