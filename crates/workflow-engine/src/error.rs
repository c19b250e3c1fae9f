//! Error types for workflow execution.

use thiserror::Error;

/// Errors that can occur while validating or executing a workflow.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Storage failure.
    #[error(transparent)]
    Database(#[from] database::DatabaseError),

    /// Credential could not be loaded or decrypted.
    #[error(transparent)]
    Vault(#[from] credential_vault::VaultError),

    /// Provider call failed.
    #[error(transparent)]
    Provider(#[from] providers::ProviderError),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Trigger or actions failed validation.
    #[error("invalid workflow definition: {0}")]
    InvalidDefinition(String),

    /// A messaging action had no organization to load credentials for.
    #[error("{action} requires an organization id on the event or the workflow")]
    MissingOrganization { action: &'static str },

    /// A transform could not be applied to its input.
    #[error("transform failed: {0}")]
    Transform(String),

    /// A database action referenced something outside the allow list.
    #[error("database action rejected: {0}")]
    DatabaseAction(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
