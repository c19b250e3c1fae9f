//! Encrypted storage of third-party provider credentials.
//!
//! Credential configs (API tokens, account ids) are JSON objects. They are
//! serialized, sealed with a [`PayloadCodec`] and stored as opaque text in
//! the `integration_credentials` table. Only [`CredentialVault::get_config`]
//! and [`CredentialVault::load_active`] ever return plaintext.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use credential_vault::{CredentialVault, SecretBoxCodec};
//!
//! let codec = SecretBoxCodec::from_env("CREDENTIALS_KEY")?;
//! let vault = CredentialVault::new(db.pool().clone(), Arc::new(codec));
//! let (credential, config) = vault.load_active("org-1", "slack").await?;
//! ```

pub mod crypto;
pub mod error;
pub mod vault;

pub use crypto::{CryptoError, NoopCodec, PayloadCodec, SecretBoxCodec};
pub use error::{Result, VaultError};
pub use vault::{CredentialSummary, CredentialUpdate, CredentialVault, NewCredential};
