use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::models::ErrorResponse;

/// Errors surfaced by the collaboration core and its request handlers.
#[derive(Debug, Error)]
pub enum ColabError {
    /// Diagram, threat model or session absent
    #[error("{0}")]
    NotFound(String),

    /// Authenticated but the role is insufficient
    #[error("{0}")]
    Forbidden(String),

    /// No valid credentials presented
    #[error("{0}")]
    Unauthorized(String),

    /// Direct mutation while a session is active
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    UnsupportedMediaType(String),

    /// Persistence failure
    #[error("{0}")]
    Server(String),

    /// The requested transform failed, nothing was persisted
    #[error("Diagram transform failed: {0}")]
    Transform(#[from] TransformError),
}

impl ColabError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::Server(message.into())
    }

    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Server(_) | Self::Transform(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ColabError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (
            status,
            Json(ErrorResponse {
                code: status.as_u16(),
                status: status.to_string(),
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Failures of the persistence collaborators
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Diagram '{0}' not found")]
    DiagramNotFound(uuid::Uuid),
}

impl From<StoreError> for ColabError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DiagramNotFound(id) => ColabError::NotFound(format!("Diagram '{}' not found", id)),
            other => ColabError::Server(other.to_string()),
        }
    }
}

/// Failure of a diagram transform. Aborts the update without persisting anything.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    /// The edit contradicts the current cell graph
    #[error("conflict on cell {cell_id}: {message}")]
    Conflict { cell_id: uuid::Uuid, message: String },

    /// The edit is malformed
    #[error("invalid operation: {0}")]
    Invalid(String),
}

pub type ColabResult<T> = Result<T, ColabError>;
