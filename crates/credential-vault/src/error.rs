use thiserror::Error;

use crate::crypto::CryptoError;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error(transparent)]
    Database(#[from] database::DatabaseError),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("serde json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid utf8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("credential config must be a JSON object")]
    InvalidConfig,
    #[error("encoding tag mismatch: expected {expected}, got {actual}")]
    EncodingMismatch { expected: String, actual: String },
    #[error("no active {provider} credential for organization {organization_id}")]
    NoActiveCredential {
        organization_id: String,
        provider: String,
    },
}

pub type Result<T> = std::result::Result<T, VaultError>;
