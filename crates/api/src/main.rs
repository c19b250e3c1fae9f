//! Beacon API server.

use std::sync::Arc;

use api::{AppState, Config, RequestLog};
use credential_vault::{CredentialVault, SecretBoxCodec};
use database::Database;
use providers::{GatewayPushSender, LoggingPushSender, PushSender};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use workflow_engine::{VaultProviderResolver, WorkflowEngine};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,sqlx=warn")),
        )
        .init();

    let config = Config::from_env()?;
    info!(addr = %config.addr, "Starting Beacon API");

    let db = Database::connect(&config.database_url).await?;
    db.migrate().await?;
    info!("Database connected and migrated");

    let codec = SecretBoxCodec::from_encoded(&config.credentials_key)?;
    let vault = CredentialVault::new(db.pool().clone(), Arc::new(codec));

    let push: Arc<dyn PushSender> = match &config.push_gateway_url {
        Some(url) => {
            info!(gateway = %url, "Delivering push notifications through gateway");
            Arc::new(GatewayPushSender::new(url.clone())?)
        }
        None => {
            warn!("PUSH_GATEWAY_URL not set, push notifications will only be logged");
            Arc::new(LoggingPushSender)
        }
    };

    let engine = WorkflowEngine::new(
        db.pool().clone(),
        Arc::new(VaultProviderResolver::new(vault.clone())),
        push.clone(),
    );

    let state = AppState::new(
        db.clone(),
        vault,
        engine,
        push,
        RequestLog::with_max_users(config.request_log_capacity, config.request_log_users),
    );
    let app = api::app(state);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!("Listening on http://{}", config.addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
