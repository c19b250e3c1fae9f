//! Audience segments backed by guarded read-only SQL.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use database::segment::{self, NewSegment, SegmentResult};
use database::UserSegment;
use serde::Deserialize;
use tracing::info;

use crate::auth::AuthUser;
use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub query: String,
}

pub async fn list(State(state): State<AppState>, caller: AuthUser) -> Result<Json<Vec<UserSegment>>> {
    Ok(Json(segment::list_segments(state.db.pool(), &caller.owner()).await?))
}

pub async fn create(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(request): Json<NewSegment>,
) -> Result<(StatusCode, Json<UserSegment>)> {
    let created = segment::create_segment(state.db.pool(), &caller.owner(), &request).await?;
    info!(segment_id = %created.id, user_count = created.user_count, "Created segment");
    Ok((StatusCode::CREATED, Json(created)))
}

/// Run a query through the guard without saving it.
pub async fn preview(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(request): Json<PreviewRequest>,
) -> Result<Json<SegmentResult>> {
    let result =
        segment::execute_segment_query(state.db.pool(), &request.query, caller.organization_id.as_deref()).await?;
    Ok(Json(result))
}

pub async fn get(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<UserSegment>> {
    Ok(Json(load_owned(&state, &caller, &id).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    load_owned(&state, &caller, &id).await?;
    segment::delete_segment(state.db.pool(), &id).await?;
    info!(segment_id = %id, "Deleted segment");
    Ok(StatusCode::NO_CONTENT)
}

/// Re-run the stored query and update the snapshot count.
pub async fn refresh(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<UserSegment>> {
    load_owned(&state, &caller, &id).await?;
    Ok(Json(segment::refresh_segment_count(state.db.pool(), &id).await?))
}

pub(crate) async fn load_owned(state: &AppState, caller: &AuthUser, id: &str) -> Result<UserSegment> {
    let stored = segment::get_segment(state.db.pool(), id).await?;
    caller.ensure_access("UserSegment", id, &stored.user_id, stored.organization_id.as_deref())?;
    Ok(stored)
}
