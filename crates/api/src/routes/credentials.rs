//! Integration credentials and provider connection checks.
//!
//! Configs are sealed by the vault before they reach SQLite; responses only
//! ever carry masked summaries.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use credential_vault::{CredentialSummary, CredentialUpdate, NewCredential};
use database::IntegrationCredential;
use providers::{build_provider, Channel, ConnectionInfo, MessageProvider, MessageTemplate, ProviderKind};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    pub provider: Option<String>,
}

/// Outcome of a connection test. Provider failures are reported, not raised.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<CredentialSummary>>> {
    Ok(Json(
        state
            .vault
            .list(&caller.owner(), query.provider.as_deref())
            .await?,
    ))
}

pub async fn create(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(request): Json<NewCredential>,
) -> Result<(StatusCode, Json<CredentialSummary>)> {
    let kind: ProviderKind = request.provider.parse()?;
    // Reject configs the provider could never be built from.
    build_provider(kind, &request.config)?;

    let created = state.vault.create(&caller.owner(), &request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<CredentialUpdate>,
) -> Result<Json<CredentialSummary>> {
    let stored = load_owned(&state, &caller, &id).await?;
    if let Some(config) = &request.config {
        build_provider(stored.provider.parse()?, config)?;
    }

    let updated = state.vault.update(&id, &request).await?;
    info!(credential_id = %id, "Updated credential");
    Ok(Json(updated))
}

pub async fn delete(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    load_owned(&state, &caller, &id).await?;
    state.vault.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Check the stored credentials against the provider's API.
pub async fn test(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<TestResult>> {
    let provider = open_provider(&state, &caller, &id).await?;

    let result = match provider.test_connection().await {
        Ok(connection) => {
            info!(credential_id = %id, account = %connection.account, "Credential test passed");
            TestResult {
                success: true,
                connection: Some(connection),
                error: None,
            }
        }
        Err(err) => {
            warn!(credential_id = %id, error = %err, "Credential test failed");
            TestResult {
                success: false,
                connection: None,
                error: Some(err.to_string()),
            }
        }
    };

    Ok(Json(result))
}

/// Slack channels reachable with the credential.
pub async fn channels(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<Channel>>> {
    let provider = open_provider(&state, &caller, &id).await?;
    Ok(Json(provider.list_channels().await?))
}

/// Approved WhatsApp templates for the credential's account.
pub async fn templates(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<MessageTemplate>>> {
    let provider = open_provider(&state, &caller, &id).await?;
    Ok(Json(provider.list_templates().await?))
}

async fn open_provider(
    state: &AppState,
    caller: &AuthUser,
    id: &str,
) -> Result<Box<dyn MessageProvider>> {
    let stored = load_owned(state, caller, id).await?;
    let config = state.vault.get_config(id).await?;
    Ok(build_provider(stored.provider.parse()?, &config)?)
}

async fn load_owned(state: &AppState, caller: &AuthUser, id: &str) -> Result<IntegrationCredential> {
    let stored = state.vault.get(id).await?;
    caller.ensure_access(
        "IntegrationCredential",
        id,
        &stored.user_id,
        stored.organization_id.as_deref(),
    )?;
    Ok(stored)
}
