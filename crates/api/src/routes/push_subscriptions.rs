//! Browser push subscriptions.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use database::push_subscription::{self, NewSubscription};
use database::PushSubscription;
use tracing::info;

use crate::auth::AuthUser;
use crate::error::{ApiError, Result};
use crate::state::AppState;

/// Subscriptions of the caller's organization, or the caller's own without one.
pub async fn list(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<Json<Vec<PushSubscription>>> {
    Ok(Json(visible_subscriptions(&state, &caller).await?))
}

/// Register a browser endpoint. Re-subscribing refreshes its keys.
pub async fn subscribe(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(mut request): Json<NewSubscription>,
) -> Result<(StatusCode, Json<PushSubscription>)> {
    if request.user_id.is_none() {
        request.user_id = Some(caller.user_id.clone());
    }
    if caller.organization_id.is_some() {
        request.organization_id = caller.organization_id.clone();
    }

    let stored = push_subscription::upsert_subscription(state.db.pool(), &request).await?;
    info!(subscription_id = %stored.id, "Registered push subscription");
    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn delete(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let visible = visible_subscriptions(&state, &caller).await?;
    if !visible.iter().any(|subscription| subscription.id == id) {
        return Err(ApiError::not_found("PushSubscription", id));
    }

    push_subscription::delete_subscription(state.db.pool(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn visible_subscriptions(
    state: &AppState,
    caller: &AuthUser,
) -> Result<Vec<PushSubscription>> {
    let subscriptions = match caller.organization_id.as_deref() {
        Some(org) => push_subscription::list_subscriptions(state.db.pool(), org).await?,
        None => {
            push_subscription::list_subscriptions_for_users(
                state.db.pool(),
                std::slice::from_ref(&caller.user_id),
            )
            .await?
        }
    };
    Ok(subscriptions)
}
