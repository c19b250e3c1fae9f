//! Recently captured requests for the caller.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::request_log::CapturedRequest;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

pub async fn recent(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(query): Query<RecentQuery>,
) -> Json<Vec<CapturedRequest>> {
    let limit = query.limit.unwrap_or(state.requests.capacity());
    Json(state.requests.recent(&caller.user_id, limit).await)
}
