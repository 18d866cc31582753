use axum::{
    http::HeaderValue,
    middleware,
    routing::get,
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;
use utoipa::OpenApi;

use crate::config::Config;
use crate::docs::ApiDoc;
use crate::handlers::{
    collaborate::{get_collaboration_session, join_collaboration_session, leave_collaboration_session},
    diagram::{create_diagram, delete_diagram, get_diagram, patch_diagram, put_diagram},
    health::health_check,
    sessions::list_collaboration_sessions,
    ws::websocket_handler,
};
use crate::routes::{auth_middleware::auth_middleware, body_guard::json_body_guard};
use crate::state::AppState;

/// Create API routes
pub fn create_api_routes(state: AppState) -> Router {
    Router::<AppState>::new()
        .route("/threat_models/:threat_model_id/diagrams", axum::routing::post(create_diagram))
        .route(
            "/threat_models/:threat_model_id/diagrams/:diagram_id",
            get(get_diagram)
                .put(put_diagram)
                .patch(patch_diagram)
                .delete(delete_diagram),
        )
        .route(
            "/threat_models/:threat_model_id/diagrams/:diagram_id/collaborate",
            get(get_collaboration_session)
                .post(join_collaboration_session)
                .put(join_collaboration_session)
                .delete(leave_collaboration_session),
        )
        .route(
            "/threat_models/:threat_model_id/diagrams/:diagram_id/ws",
            get(websocket_handler),
        )
        .route("/collaboration", get(list_collaboration_sessions))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware)) // Applies to all routes added above
        .with_state(state)
}

/// The whole service: authenticated API, health and the OpenAPI document
pub fn create_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let public = Router::<AppState>::new()
        .route("/health", get(health_check))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .with_state(state.clone());
    Router::new()
        .merge(create_api_routes(state))
        .merge(public)
        .layer(middleware::from_fn(json_body_guard))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .as_deref()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        if config.is_development() {
            return CorsLayer::permissive();
        }
        return CorsLayer::new();
    }
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}
