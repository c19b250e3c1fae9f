//! HTTP API for Beacon.
//!
//! Tracks events, runs matching workflows, and manages the records those
//! workflows use: segments, promo codes, integration credentials, push
//! subscriptions, campaigns and webhooks.
//!
//! Callers are identified by the `x-user-id` and `x-organization-id` headers
//! set by the fronting auth proxy.

pub mod auth;
pub mod config;
pub mod error;
pub mod request_log;
pub mod routes;
pub mod state;

use axum::middleware;
use axum::Router;
use tower_http::trace::TraceLayer;

pub use auth::AuthUser;
pub use config::{Config, ConfigError};
pub use error::{ApiError, Result};
pub use request_log::{CapturedRequest, RequestLog};
pub use state::AppState;

/// Build the complete application with state and middleware attached.
pub fn app(state: AppState) -> Router {
    let requests = state.requests.clone();
    routes::router()
        .with_state(state)
        .layer(middleware::from_fn_with_state(
            requests,
            request_log::capture_requests,
        ))
        .layer(TraceLayer::new_for_http())
}
