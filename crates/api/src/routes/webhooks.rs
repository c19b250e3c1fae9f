//! Outbound webhook registrations.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use database::{webhook, Webhook};
use serde::Deserialize;
use tracing::info;

use crate::auth::AuthUser;
use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NewWebhook {
    pub url: String,
    #[serde(default)]
    pub events: Vec<String>,
}

pub async fn list(State(state): State<AppState>, caller: AuthUser) -> Result<Json<Vec<Webhook>>> {
    Ok(Json(webhook::list_webhooks(state.db.pool(), &caller.owner()).await?))
}

/// Register a webhook. The response carries the generated signing secret.
pub async fn create(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(request): Json<NewWebhook>,
) -> Result<(StatusCode, Json<Webhook>)> {
    let created =
        webhook::create_webhook(state.db.pool(), &caller.owner(), &request.url, &request.events).await?;
    info!(webhook_id = %created.id, url = %created.url, "Registered webhook");
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn delete(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let stored = webhook::get_webhook(state.db.pool(), &id).await?;
    caller.ensure_access("Webhook", &id, &stored.user_id, stored.organization_id.as_deref())?;
    webhook::delete_webhook(state.db.pool(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
