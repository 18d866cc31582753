use axum::{
    body::HttpBody,
    extract::Request,
    http::{header, Method},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::error::ColabError;

fn is_json(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    mime == "application/json" || mime.ends_with("+json")
}

/// POST/PUT/PATCH bodies must be JSON. The live endpoint carries no body and is exempt.
pub async fn json_body_guard(req: Request, next: Next) -> Result<Response, ColabError> {
    let writes = matches!(*req.method(), Method::POST | Method::PUT | Method::PATCH);
    if !writes || req.uri().path().ends_with("/ws") {
        return Ok(next.run(req).await);
    }

    let declared_empty = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|len| len == 0);
    let empty = declared_empty.unwrap_or_else(|| req.body().size_hint().exact() == Some(0));
    if empty {
        return Ok(next.run(req).await);
    }

    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !is_json(content_type) {
        debug!(
            "Rejecting {} {} with content type '{}'",
            req.method(),
            req.uri().path(),
            content_type
        );
        return Err(ColabError::UnsupportedMediaType(
            "Request body must be application/json".to_string(),
        ));
    }
    Ok(next.run(req).await)
}
