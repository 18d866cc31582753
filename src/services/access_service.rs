use uuid::Uuid;

use crate::auth::auth::ensure_role;
use crate::error::{ColabError, ColabResult};
use crate::models::{DiagramSnapshot, Role, ThreatModel};
use crate::state::AppState;

/// Look up the threat model and check the caller's role on it.
///
/// Runs before any session state is touched: 404 then 403.
pub async fn authorize(
    state: &AppState,
    threat_model_id: Uuid,
    user_id: &str,
    required: Role,
) -> ColabResult<ThreatModel> {
    let threat_model = state
        .threat_models
        .get(threat_model_id)
        .await?
        .ok_or_else(|| ColabError::not_found(format!("Threat model '{}' not found", threat_model_id)))?;
    ensure_role(&threat_model, user_id, required)?;
    Ok(threat_model)
}

/// The diagram must exist and belong to `threat_model`
pub async fn load_diagram(
    state: &AppState,
    threat_model: &ThreatModel,
    diagram_id: Uuid,
) -> ColabResult<DiagramSnapshot> {
    let not_found = || ColabError::not_found(format!("Diagram '{}' not found", diagram_id));
    if !threat_model.contains_diagram(diagram_id) {
        return Err(not_found());
    }
    let diagram = state.diagrams.get(diagram_id).await?.ok_or_else(not_found)?;
    if diagram.threat_model_id != threat_model.id {
        return Err(not_found());
    }
    Ok(diagram)
}
