//! Push campaigns: drafting, fan-out and engagement tracking.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use database::{campaign, push_subscription, segment, Campaign, CampaignInput, PushSubscription};
use providers::{send_all, PushMessage, PushReport, PushTarget};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::AuthUser;
use crate::error::{ApiError, Result};
use crate::routes::push_subscriptions::visible_subscriptions;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub campaign: Campaign,
    pub report: PushReport,
}

/// Beacon posted by the service worker when a notification is clicked or closed.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRequest {
    pub campaign_id: String,
}

pub async fn list(State(state): State<AppState>, caller: AuthUser) -> Result<Json<Vec<Campaign>>> {
    Ok(Json(campaign::list_campaigns(state.db.pool(), &caller.owner()).await?))
}

pub async fn create(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(request): Json<CampaignInput>,
) -> Result<(StatusCode, Json<Campaign>)> {
    if let Some(segment_id) = &request.segment_id {
        crate::routes::segments::load_owned(&state, &caller, segment_id).await?;
    }
    let created = campaign::create_campaign(state.db.pool(), &caller.owner(), &request).await?;
    info!(campaign_id = %created.id, "Created campaign");
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Campaign>> {
    Ok(Json(load_owned(&state, &caller, &id).await?))
}

pub async fn update(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<CampaignInput>,
) -> Result<Json<Campaign>> {
    load_owned(&state, &caller, &id).await?;
    if let Some(segment_id) = &request.segment_id {
        crate::routes::segments::load_owned(&state, &caller, segment_id).await?;
    }
    Ok(Json(campaign::update_campaign(state.db.pool(), &id, &request).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    load_owned(&state, &caller, &id).await?;
    campaign::delete_campaign(state.db.pool(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Push a draft campaign to its audience and mark it sent.
///
/// The audience is the campaign's segment when it has one, otherwise every
/// subscription visible to the caller. Endpoints the push service reports as
/// gone are deleted.
pub async fn send(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<SendResponse>> {
    let draft = load_owned(&state, &caller, &id).await?;
    if draft.status == "sent" {
        return Err(ApiError::Conflict(format!("campaign {id} was already sent")));
    }

    let subscriptions = audience(&state, &caller, &draft).await?;
    let targets: Vec<PushTarget> = subscriptions
        .iter()
        .map(|sub| PushTarget::new(&sub.endpoint, &sub.p256dh, &sub.auth))
        .collect();

    let mut message = PushMessage::new(&draft.title, &draft.body);
    message.url = draft.url.clone();
    message.campaign_id = Some(draft.id.clone());

    let report = send_all(state.push.as_ref(), &targets, &message).await;
    if !report.expired.is_empty() {
        let pruned = push_subscription::prune_endpoints(state.db.pool(), &report.expired).await?;
        warn!(campaign_id = %id, pruned, "Pruned expired push subscriptions");
    }

    let sent = campaign::mark_sent(state.db.pool(), &id, report.sent as i64).await?;
    info!(
        campaign_id = %id,
        sent = report.sent,
        failed = report.failed,
        "Sent campaign"
    );

    Ok(Json(SendResponse {
        campaign: sent,
        report,
    }))
}

pub async fn track_click(
    State(state): State<AppState>,
    Json(request): Json<TrackRequest>,
) -> Result<StatusCode> {
    campaign::record_click(state.db.pool(), &request.campaign_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn track_close(
    State(state): State<AppState>,
    Json(request): Json<TrackRequest>,
) -> Result<StatusCode> {
    campaign::record_close(state.db.pool(), &request.campaign_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn audience(
    state: &AppState,
    caller: &AuthUser,
    draft: &Campaign,
) -> Result<Vec<PushSubscription>> {
    let Some(segment_id) = &draft.segment_id else {
        return visible_subscriptions(state, caller).await;
    };

    let stored = crate::routes::segments::load_owned(state, caller, segment_id).await?;
    let members =
        segment::execute_segment_query(state.db.pool(), &stored.query, stored.organization_id.as_deref()).await?;
    let subscriptions = visible_subscriptions(state, caller)
        .await?
        .into_iter()
        .filter(|s| s.user_id.as_ref().is_some_and(|u| members.user_ids.contains(u)))
        .collect();
    Ok(subscriptions)
}

async fn load_owned(state: &AppState, caller: &AuthUser, id: &str) -> Result<Campaign> {
    let stored = campaign::get_campaign(state.db.pool(), id).await?;
    caller.ensure_access("Campaign", id, &stored.user_id, stored.organization_id.as_deref())?;
    Ok(stored)
}
