//! Error types for provider clients.

use thiserror::Error;

/// Errors that can occur when talking to a messaging provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Provider answered with a non-success status.
    #[error("{provider} API error {status}: {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },

    /// Provider answered 200 but reported a failure in the body.
    #[error("{provider} rejected request: {message}")]
    Rejected {
        provider: &'static str,
        message: String,
    },

    /// Invalid or incomplete provider configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Operation not offered by this provider.
    #[error("{provider} does not support {operation}")]
    Unsupported {
        provider: &'static str,
        operation: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, ProviderError>;
