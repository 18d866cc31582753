use utoipa::OpenApi;
use crate::models::*;
#[allow(unused_imports)]
use uuid::Uuid;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Current collaboration session of a diagram
#[utoipa::path(
    get,
    path = "/threat_models/{threat_model_id}/diagrams/{diagram_id}/collaborate",
    params(
        ("threat_model_id" = Uuid, Path, description = "Threat model id"),
        ("diagram_id" = Uuid, Path, description = "Diagram id")
    ),
    responses(
        (status = 200, description = "Active session", body = CollaborationSessionView),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "Insufficient role", body = ErrorResponse),
        (status = 404, description = "No active session", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn get_collaboration_session_doc() {}

/// Create or join the collaboration session of a diagram (PUT behaves the same)
#[utoipa::path(
    post,
    path = "/threat_models/{threat_model_id}/diagrams/{diagram_id}/collaborate",
    params(
        ("threat_model_id" = Uuid, Path, description = "Threat model id"),
        ("diagram_id" = Uuid, Path, description = "Diagram id")
    ),
    responses(
        (status = 201, description = "Session created", body = CollaborationSessionView),
        (status = 200, description = "Session already active", body = CollaborationSessionView),
        (status = 403, description = "Insufficient role", body = ErrorResponse),
        (status = 404, description = "Diagram not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn join_collaboration_session_doc() {}

/// Leave the collaboration session, the host closes it
#[utoipa::path(
    delete,
    path = "/threat_models/{threat_model_id}/diagrams/{diagram_id}/collaborate",
    params(
        ("threat_model_id" = Uuid, Path, description = "Threat model id"),
        ("diagram_id" = Uuid, Path, description = "Diagram id")
    ),
    responses(
        (status = 204, description = "Left the session"),
        (status = 404, description = "Diagram not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn leave_collaboration_session_doc() {}

/// Active sessions the caller can read
#[utoipa::path(
    get,
    path = "/collaboration",
    responses(
        (status = 200, description = "Active sessions", body = [CollaborationSessionView])
    )
)]
#[allow(dead_code)]
pub async fn list_collaboration_sessions_doc() {}

/// Replace a diagram
#[utoipa::path(
    put,
    path = "/threat_models/{threat_model_id}/diagrams/{diagram_id}",
    params(
        ("threat_model_id" = Uuid, Path, description = "Threat model id"),
        ("diagram_id" = Uuid, Path, description = "Diagram id")
    ),
    request_body = UpdateDiagramRequest,
    responses(
        (status = 200, description = "Diagram updated", body = DiagramSnapshot),
        (status = 409, description = "Collaboration session active", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn put_diagram_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        get_collaboration_session_doc,
        join_collaboration_session_doc,
        leave_collaboration_session_doc,
        list_collaboration_sessions_doc,
        put_diagram_doc,
    ),
    components(
        schemas(
            HealthResponse,
            ErrorResponse,
            ParticipantView,
            CollaborationSessionView,
            Cell,
            DiagramSnapshot,
            CreateDiagramRequest,
            UpdateDiagramRequest,
            PatchDiagramRequest
        )
    ),
    tags(
        (name = "collaboration", description = "Diagram collaboration endpoints")
    )
)]
pub struct ApiDoc;
