//! Event tracking endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use database::event::{self, EventFilter};
use database::{Event, NewEvent};
use serde::{Deserialize, Serialize};
use tracing::info;
use workflow_engine::ExecutionSummary;

use crate::auth::AuthUser;
use crate::error::{ApiError, Result};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackResponse {
    pub event: Event,
    pub executions: Vec<ExecutionSummary>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListQuery {
    pub name: Option<String>,
    pub category: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

/// Store an event and run every workflow it triggers.
///
/// Events are stamped with the caller's organization, overriding any
/// organization named in the body.
pub async fn track(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(mut request): Json<NewEvent>,
) -> Result<(StatusCode, Json<TrackResponse>)> {
    request.organization_id = caller.organization_id.clone();
    if request.user_id.is_none() && request.organization_id.is_none() {
        request.user_id = Some(caller.user_id.clone());
    }

    let stored = event::insert_event(state.db.pool(), &request).await?;
    let executions = state.engine.handle_event(&stored).await?;

    info!(
        event_id = %stored.id,
        name = %stored.name,
        workflows = executions.len(),
        "Tracked event"
    );

    Ok((
        StatusCode::CREATED,
        Json(TrackResponse {
            event: stored,
            executions,
        }),
    ))
}

/// List events visible to the caller, newest first.
///
/// Organization members see the organization's events; callers without an
/// organization see events tracked for themselves.
pub async fn list(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Event>>> {
    let filter = EventFilter {
        name: query.name,
        category: query.category,
        user_id: match caller.organization_id {
            Some(_) => None,
            None => Some(caller.user_id.clone()),
        },
        organization_id: caller.organization_id.clone(),
        limit: query.limit,
    };

    Ok(Json(event::list_events(state.db.pool(), &filter).await?))
}

pub async fn get(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Event>> {
    let stored = event::get_event(state.db.pool(), &id).await?;
    ensure_event_access(&caller, &stored)?;
    Ok(Json(stored))
}

/// Event counts per category for the caller's organization.
pub async fn categories(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<Json<Vec<CategoryCount>>> {
    let Some(organization_id) = caller.organization_id.as_deref() else {
        return Ok(Json(Vec::new()));
    };

    let counts = event::count_events_by_category(state.db.pool(), Some(organization_id))
        .await?
        .into_iter()
        .map(|(category, count)| CategoryCount { category, count })
        .collect();

    Ok(Json(counts))
}

fn ensure_event_access(caller: &AuthUser, stored: &Event) -> Result<()> {
    let visible = match stored.organization_id.as_deref() {
        Some(org) => caller.organization_id.as_deref() == Some(org),
        None => stored.user_id.as_deref() == Some(caller.user_id.as_str()),
    };
    if visible {
        Ok(())
    } else {
        Err(ApiError::not_found("Event", &stored.id))
    }
}
