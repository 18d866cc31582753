use axum::{
    extract::{Extension, State},
    http::HeaderMap,
    Json,
};
use std::collections::HashMap;
use tracing::warn;

use super::collaborate::request_host;
use crate::auth::auth::has_role;
use crate::colab::build_session_view;
use crate::error::ColabResult;
use crate::models::{CollaborationSessionView, Role};
use crate::routes::auth_middleware::AuthUser;
use crate::state::AppState;

/// Active sessions on threat models the caller can read
pub async fn list_collaboration_sessions(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    headers: HeaderMap,
) -> ColabResult<Json<Vec<CollaborationSessionView>>> {
    let deployment = state.config.deployment();
    let mut readable = HashMap::new();
    let mut views = Vec::new();

    for session in state.registry.list().await {
        let allowed = match readable.get(&session.threat_model_id) {
            Some(allowed) => *allowed,
            None => {
                let allowed = match state.threat_models.get(session.threat_model_id).await? {
                    Some(tm) => has_role(&tm, &user_id, Role::Reader),
                    None => {
                        warn!(
                            "Session {} refers to missing threat model '{}'",
                            session.id, session.threat_model_id
                        );
                        false
                    }
                };
                readable.insert(session.threat_model_id, allowed);
                allowed
            }
        };
        if allowed {
            views.push(build_session_view(
                &session.snapshot().await,
                &deployment,
                request_host(&headers),
            ));
        }
    }

    views.sort_by(|a, b| a.session_id.cmp(&b.session_id));
    Ok(Json(views))
}
