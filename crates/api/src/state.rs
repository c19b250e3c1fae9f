//! Application state shared across handlers.

use std::sync::Arc;

use credential_vault::CredentialVault;
use database::Database;
use providers::PushSender;
use workflow_engine::WorkflowEngine;

use crate::request_log::RequestLog;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Database connection.
    pub db: Database,
    /// Encrypted integration credentials.
    pub vault: CredentialVault,
    /// Runs workflows for tracked events.
    pub engine: WorkflowEngine,
    /// Browser push delivery for campaigns.
    pub push: Arc<dyn PushSender>,
    /// Recently captured requests.
    pub requests: RequestLog,
}

impl AppState {
    /// Create new application state.
    pub fn new(
        db: Database,
        vault: CredentialVault,
        engine: WorkflowEngine,
        push: Arc<dyn PushSender>,
        requests: RequestLog,
    ) -> Self {
        Self {
            db,
            vault,
            engine,
            push,
            requests,
        }
    }
}
