use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error};

use crate::error::ColabError;
use crate::services::auth_service::{get_auth_token, get_user_id};
use crate::state::AppState;

/// Authenticated caller, inserted into request extensions by `auth_middleware`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser(pub String);

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ColabError> {
    // 1. Get the auth token from the request
    let token = get_auth_token(&req).map_err(|e| {
        debug!("Rejecting {}: {}", req.uri().path(), e);
        ColabError::unauthorized("Authentication required")
    })?;

    // 2. Validate token
    let secret = match &state.config.auth_jwt_secret {
        Some(secret) => secret,
        None => {
            error!("Auth JWT secret not configured");
            return Err(ColabError::server("Authentication is not configured"));
        }
    };
    let user_id = get_user_id(&token, secret).map_err(|e| {
        error!("{}", e);
        ColabError::unauthorized("Invalid or expired token")
    })?;

    // 3. Hand the caller to downstream handlers
    req.extensions_mut().insert(AuthUser(user_id));
    Ok(next.run(req).await)
}
