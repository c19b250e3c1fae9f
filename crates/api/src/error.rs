//! Error types for the HTTP API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use credential_vault::VaultError;
use database::DatabaseError;
use providers::ProviderError;
use thiserror::Error;
use workflow_engine::EngineError;

/// Errors returned by API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Request body or parameters rejected.
    #[error("{0}")]
    BadRequest(String),

    /// No `x-user-id` header.
    #[error("missing x-user-id header")]
    Unauthorized,

    /// Resource missing or owned by someone else.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Request conflicts with the resource's current state.
    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        ApiError::NotFound {
            entity,
            id: id.into(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Database(err) => database_status(err),
            ApiError::Vault(err) => vault_status(err),
            ApiError::Provider(err) => provider_status(err),
            ApiError::Engine(err) => match err {
                EngineError::Database(inner) => database_status(inner),
                EngineError::Vault(inner) => vault_status(inner),
                EngineError::InvalidDefinition(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn database_status(err: &DatabaseError) -> StatusCode {
    match err {
        DatabaseError::NotFound { .. } => StatusCode::NOT_FOUND,
        DatabaseError::AlreadyExists { .. }
        | DatabaseError::Exhausted { .. }
        | DatabaseError::ExecutionFinished(_) => StatusCode::CONFLICT,
        DatabaseError::Invalid(_)
        | DatabaseError::QueryRejected(_)
        | DatabaseError::QueryTimeout(_)
        | DatabaseError::BatchUnavailable { .. } => StatusCode::BAD_REQUEST,
        DatabaseError::Sqlx(_) | DatabaseError::Migration(_) | DatabaseError::Json(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn vault_status(err: &VaultError) -> StatusCode {
    match err {
        VaultError::Database(inner) => database_status(inner),
        VaultError::InvalidConfig => StatusCode::BAD_REQUEST,
        VaultError::NoActiveCredential { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn provider_status(err: &ProviderError) -> StatusCode {
    match err {
        ProviderError::Config(_) | ProviderError::Unsupported { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            serde_json::json!({
                "error": "Internal server error",
                "details": self.to_string(),
            })
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
            serde_json::json!({ "error": self.to_string() })
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type Result<T> = std::result::Result<T, ApiError>;
