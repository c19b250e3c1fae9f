//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct Health {
    pub status: String,
    pub database: String,
}

/// Health check endpoint. Reports `degraded` when SQLite does not answer.
pub async fn health(State(state): State<AppState>) -> Json<Health> {
    let database = match state.db.ping().await {
        Ok(()) => "ok".to_string(),
        Err(err) => {
            tracing::warn!(error = %err, "Database health check failed");
            "unavailable".to_string()
        }
    };

    Json(Health {
        status: if database == "ok" { "ok" } else { "degraded" }.to_string(),
        database,
    })
}
