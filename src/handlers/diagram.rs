use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;
use uuid::Uuid;

use crate::error::ColabResult;
use crate::models::{CreateDiagramRequest, DiagramSnapshot, PatchDiagramRequest, Role, UpdateDiagramRequest};
use crate::routes::auth_middleware::AuthUser;
use crate::services::access_service::{authorize, load_diagram};
use crate::services::diagram_service::{patch_transform, replace_transform};
use crate::state::AppState;

/// Create an empty diagram under a threat model
pub async fn create_diagram(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(threat_model_id): Path<Uuid>,
    Json(request): Json<CreateDiagramRequest>,
) -> ColabResult<(StatusCode, Json<DiagramSnapshot>)> {
    authorize(&state, threat_model_id, &user_id, Role::Writer).await?;

    let mut diagram = DiagramSnapshot::new(threat_model_id, request.name);
    diagram.description = request.description;
    state.diagrams.create(&diagram).await?;

    info!(
        "Diagram '{}' created in threat model '{}' by {}",
        diagram.id, threat_model_id, user_id
    );
    Ok((StatusCode::CREATED, Json(diagram)))
}

pub async fn get_diagram(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path((threat_model_id, diagram_id)): Path<(Uuid, Uuid)>,
) -> ColabResult<Json<DiagramSnapshot>> {
    let threat_model = authorize(&state, threat_model_id, &user_id, Role::Reader).await?;
    let diagram = load_diagram(&state, &threat_model, diagram_id).await?;
    Ok(Json(diagram))
}

/// Replace a diagram. Refused while a collaboration session is active.
pub async fn put_diagram(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path((threat_model_id, diagram_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateDiagramRequest>,
) -> ColabResult<Json<DiagramSnapshot>> {
    let threat_model = authorize(&state, threat_model_id, &user_id, Role::Writer).await?;
    load_diagram(&state, &threat_model, diagram_id).await?;

    let outcome = state
        .pipeline
        .update_without_session(diagram_id, replace_transform(request), &user_id)
        .await?;
    Ok(Json(outcome.snapshot))
}

/// Merge-patch a diagram. Refused while a collaboration session is active.
pub async fn patch_diagram(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path((threat_model_id, diagram_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<PatchDiagramRequest>,
) -> ColabResult<Json<DiagramSnapshot>> {
    let threat_model = authorize(&state, threat_model_id, &user_id, Role::Writer).await?;
    load_diagram(&state, &threat_model, diagram_id).await?;

    let outcome = state
        .pipeline
        .update_without_session(diagram_id, patch_transform(request), &user_id)
        .await?;
    Ok(Json(outcome.snapshot))
}

/// Delete a diagram. Refused while a collaboration session is active.
pub async fn delete_diagram(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path((threat_model_id, diagram_id)): Path<(Uuid, Uuid)>,
) -> ColabResult<StatusCode> {
    let threat_model = authorize(&state, threat_model_id, &user_id, Role::Owner).await?;
    load_diagram(&state, &threat_model, diagram_id).await?;
    state.pipeline.delete_diagram(diagram_id, &user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
