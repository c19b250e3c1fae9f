use std::sync::Arc;

use base64::Engine;
use database::credential;
use database::{IntegrationCredential, Owner};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::crypto::PayloadCodec;
use crate::error::{Result, VaultError};

/// Request to store a new credential.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCredential {
    pub provider: String,
    pub name: String,
    pub config: Value,
}

/// Partial credential update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialUpdate {
    pub name: Option<String>,
    pub config: Option<Value>,
    pub is_active: Option<bool>,
}

/// Credential metadata with secret values masked.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSummary {
    pub id: String,
    pub provider: String,
    pub name: String,
    pub organization_id: Option<String>,
    pub is_active: bool,
    pub config: Map<String, Value>,
    pub created_at: String,
    pub updated_at: String,
}

/// Credential store that encrypts config blobs on the way in and decrypts on the way out.
#[derive(Clone)]
pub struct CredentialVault {
    pool: SqlitePool,
    codec: Arc<dyn PayloadCodec>,
}

impl CredentialVault {
    pub fn new(pool: SqlitePool, codec: Arc<dyn PayloadCodec>) -> Self {
        Self { pool, codec }
    }

    pub async fn create(&self, owner: &Owner, request: &NewCredential) -> Result<CredentialSummary> {
        let sealed = self.seal(&request.config)?;
        let stored =
            credential::create_credential(&self.pool, owner, &request.provider, &request.name, &sealed)
                .await?;
        info!(credential_id = %stored.id, provider = %stored.provider, "Stored credential");
        self.summarize(&stored)
    }

    pub async fn get(&self, id: &str) -> Result<IntegrationCredential> {
        Ok(credential::get_credential(&self.pool, id).await?)
    }

    pub async fn get_config(&self, id: &str) -> Result<Value> {
        let stored = credential::get_credential(&self.pool, id).await?;
        self.open(&stored.config)
    }

    /// Load and decrypt the active credential of an organization for a provider.
    pub async fn load_active(
        &self,
        organization_id: &str,
        provider: &str,
    ) -> Result<(IntegrationCredential, Value)> {
        let stored = credential::find_active(&self.pool, organization_id, provider)
            .await?
            .ok_or_else(|| VaultError::NoActiveCredential {
                organization_id: organization_id.to_string(),
                provider: provider.to_string(),
            })?;
        debug!(credential_id = %stored.id, provider, "Loaded active credential");
        let config = self.open(&stored.config)?;
        Ok((stored, config))
    }

    pub async fn update(&self, id: &str, update: &CredentialUpdate) -> Result<CredentialSummary> {
        let sealed = update.config.as_ref().map(|config| self.seal(config)).transpose()?;
        let stored = credential::update_credential(
            &self.pool,
            id,
            update.name.as_deref(),
            sealed.as_deref(),
            update.is_active,
        )
        .await?;
        self.summarize(&stored)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        credential::delete_credential(&self.pool, id).await?;
        info!(credential_id = %id, "Deleted credential");
        Ok(())
    }

    pub async fn list(&self, owner: &Owner, provider: Option<&str>) -> Result<Vec<CredentialSummary>> {
        credential::list_credentials(&self.pool, owner, provider)
            .await?
            .iter()
            .map(|stored| self.summarize(stored))
            .collect()
    }

    pub fn summarize(&self, stored: &IntegrationCredential) -> Result<CredentialSummary> {
        let config = match self.open(&stored.config)? {
            Value::Object(map) => map
                .into_iter()
                .map(|(key, value)| (key, mask_value(&value)))
                .collect(),
            _ => Map::new(),
        };

        Ok(CredentialSummary {
            id: stored.id.clone(),
            provider: stored.provider.clone(),
            name: stored.name.clone(),
            organization_id: stored.organization_id.clone(),
            is_active: stored.is_active,
            config,
            created_at: stored.created_at.clone(),
            updated_at: stored.updated_at.clone(),
        })
    }

    fn seal(&self, config: &Value) -> Result<String> {
        if !config.is_object() {
            return Err(VaultError::InvalidConfig);
        }
        let plaintext = serde_json::to_vec(config)?;
        let encoded = self.codec.seal(&plaintext)?;

        match self.codec.scheme() {
            Some(tag) => Ok(format!(
                "{tag}:{}",
                base64::engine::general_purpose::STANDARD.encode(encoded)
            )),
            None => Ok(String::from_utf8(encoded)?),
        }
    }

    fn open(&self, stored: &str) -> Result<Value> {
        let plaintext = match self.codec.scheme() {
            Some(tag) => {
                let (actual, body) = stored.split_once(':').unwrap_or(("", stored));
                if actual != tag {
                    return Err(VaultError::EncodingMismatch {
                        expected: tag.to_string(),
                        actual: actual.to_string(),
                    });
                }
                let bytes = base64::engine::general_purpose::STANDARD.decode(body)?;
                self.codec.open(&bytes)?
            }
            None => self.codec.open(stored.as_bytes())?,
        };
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

/// Mask a config value: strings keep their last four characters when long enough.
fn mask_value(value: &Value) -> Value {
    match value {
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            if chars.len() >= 12 {
                let tail: String = chars[chars.len() - 4..].iter().collect();
                Value::String(format!("****{tail}"))
            } else {
                Value::String("****".to_string())
            }
        }
        Value::Null | Value::Bool(_) => value.clone(),
        _ => Value::String("****".to_string()),
    }
}
