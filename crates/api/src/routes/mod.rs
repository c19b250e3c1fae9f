//! Route handlers for the Beacon API.

pub mod campaigns;
pub mod credentials;
pub mod events;
pub mod health;
pub mod promo_codes;
pub mod push_subscriptions;
pub mod requests;
pub mod segments;
pub mod webhooks;
pub mod workflows;

use axum::routing::{get, post, put};
use axum::Router;

use crate::state::AppState;

/// Build the router with all routes.
pub fn router() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(health::health))
        // Event tracking
        .route("/api/events", post(events::track).get(events::list))
        .route("/api/events/categories", get(events::categories))
        .route("/api/events/:id", get(events::get))
        // Workflows
        .route("/api/workflows", get(workflows::list).post(workflows::create))
        .route(
            "/api/workflows/:id",
            get(workflows::get).put(workflows::replace).delete(workflows::delete),
        )
        .route("/api/workflows/:id/toggle", post(workflows::toggle))
        .route("/api/workflows/:id/executions", get(workflows::executions))
        .route("/api/executions/:id", get(workflows::execution))
        // Segments
        .route("/api/segments", get(segments::list).post(segments::create))
        .route("/api/segments/preview", post(segments::preview))
        .route("/api/segments/:id", get(segments::get).delete(segments::delete))
        .route("/api/segments/:id/refresh", post(segments::refresh))
        // Promo codes
        .route(
            "/api/promo-codes/batches",
            get(promo_codes::list_batches).post(promo_codes::create_batch),
        )
        .route("/api/promo-codes/batches/:id/codes", get(promo_codes::list_codes))
        .route("/api/promo-codes/batches/:id/claim", post(promo_codes::claim))
        .route("/api/promo-codes/redeem", post(promo_codes::redeem))
        // Integration credentials
        .route("/api/credentials", get(credentials::list).post(credentials::create))
        .route(
            "/api/credentials/:id",
            put(credentials::update).delete(credentials::delete),
        )
        .route("/api/credentials/:id/test", post(credentials::test))
        .route("/api/credentials/:id/channels", get(credentials::channels))
        .route("/api/credentials/:id/templates", get(credentials::templates))
        // Browser push
        .route(
            "/api/push-subscriptions",
            get(push_subscriptions::list).post(push_subscriptions::subscribe),
        )
        .route("/api/push-subscriptions/:id", axum::routing::delete(push_subscriptions::delete))
        // Campaigns
        .route("/api/campaigns", get(campaigns::list).post(campaigns::create))
        .route("/api/campaigns/track-click", post(campaigns::track_click))
        .route("/api/campaigns/track-close", post(campaigns::track_close))
        .route(
            "/api/campaigns/:id",
            get(campaigns::get).put(campaigns::update).delete(campaigns::delete),
        )
        .route("/api/campaigns/:id/send", post(campaigns::send))
        // Webhooks
        .route("/api/webhooks", get(webhooks::list).post(webhooks::create))
        .route("/api/webhooks/:id", axum::routing::delete(webhooks::delete))
        // Request capture
        .route("/api/requests/recent", get(requests::recent))
}
