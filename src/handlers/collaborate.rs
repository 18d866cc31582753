use axum::{
    extract::{Extension, Path, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use tracing::info;
use uuid::Uuid;

use crate::colab::{build_session_view, registry::REASON_CLOSED_BY_HOST};
use crate::error::{ColabError, ColabResult};
use crate::models::{CollaborationSessionView, Role};
use crate::routes::auth_middleware::AuthUser;
use crate::services::access_service::{authorize, load_diagram};
use crate::state::AppState;

pub(crate) fn request_host(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::HOST).and_then(|v| v.to_str().ok())
}

/// Current collaboration session of a diagram
pub async fn get_collaboration_session(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path((threat_model_id, diagram_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
) -> ColabResult<Json<CollaborationSessionView>> {
    let threat_model = authorize(&state, threat_model_id, &user_id, Role::Reader).await?;
    load_diagram(&state, &threat_model, diagram_id).await?;

    let session = state.registry.get(diagram_id).await.ok_or_else(|| {
        ColabError::not_found(format!(
            "No active collaboration session for diagram '{}'",
            diagram_id
        ))
    })?;

    let view = build_session_view(
        &session.snapshot().await,
        &state.config.deployment(),
        request_host(&headers),
    );
    Ok(Json(view))
}

/// Create-or-join: 201 when this call established the session, 200 otherwise.
///
/// Joining here only returns session metadata, the caller becomes a
/// participant once its WebSocket connects.
pub async fn join_collaboration_session(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path((threat_model_id, diagram_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
) -> ColabResult<(StatusCode, Json<CollaborationSessionView>)> {
    let threat_model = authorize(&state, threat_model_id, &user_id, Role::Reader).await?;
    load_diagram(&state, &threat_model, diagram_id).await?;

    let entry = state
        .registry
        .create(diagram_id, threat_model_id, &user_id)
        .await;
    let status = if entry.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    let view = build_session_view(
        &entry.session.snapshot().await,
        &state.config.deployment(),
        request_host(&headers),
    );
    Ok((status, Json(view)))
}

/// Leave the session. The host leaving closes it for everyone.
pub async fn leave_collaboration_session(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path((threat_model_id, diagram_id)): Path<(Uuid, Uuid)>,
) -> ColabResult<StatusCode> {
    let threat_model = authorize(&state, threat_model_id, &user_id, Role::Reader).await?;
    load_diagram(&state, &threat_model, diagram_id).await?;

    if let Some(session) = state.registry.get(diagram_id).await {
        if session.is_host(&user_id) && state.registry.close_session(&session, REASON_CLOSED_BY_HOST).await {
            info!(
                "Host {} closed session {} on diagram {}",
                user_id, session.id, diagram_id
            );
        }
    }
    Ok(StatusCode::NO_CONTENT)
}
