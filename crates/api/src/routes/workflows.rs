//! Workflow management and execution history.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use database::{execution, workflow, Workflow, WorkflowExecution, WorkflowExecutionStep, WorkflowInput};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use workflow_engine::WorkflowDefinition;

use crate::auth::AuthUser;
use crate::error::Result;
use crate::state::AppState;

/// Create or replace request. New workflows are active unless stated otherwise.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRequest {
    pub name: String,
    pub trigger: Value,
    pub actions: Value,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl WorkflowRequest {
    /// Reject definitions the engine could not run.
    fn validated(self) -> Result<WorkflowInput> {
        WorkflowDefinition::parse(&self.trigger, &self.actions)?;
        Ok(WorkflowInput {
            name: self.name,
            trigger: self.trigger,
            actions: self.actions,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExecutionsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionDetail {
    #[serde(flatten)]
    pub execution: WorkflowExecution,
    pub steps: Vec<WorkflowExecutionStep>,
}

pub async fn list(State(state): State<AppState>, caller: AuthUser) -> Result<Json<Vec<Workflow>>> {
    Ok(Json(workflow::list_workflows(state.db.pool(), &caller.owner()).await?))
}

pub async fn create(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(request): Json<WorkflowRequest>,
) -> Result<(StatusCode, Json<Workflow>)> {
    let input = request.validated()?;
    let created = workflow::create_workflow(state.db.pool(), &caller.owner(), &input).await?;
    info!(workflow_id = %created.id, name = %created.name, "Created workflow");
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Workflow>> {
    Ok(Json(load_owned(&state, &caller, &id).await?))
}

/// Replace name, trigger, actions and active flag in one write.
pub async fn replace(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<WorkflowRequest>,
) -> Result<Json<Workflow>> {
    load_owned(&state, &caller, &id).await?;
    let input = request.validated()?;
    let updated = workflow::replace_workflow(state.db.pool(), &id, &input).await?;
    info!(workflow_id = %id, "Replaced workflow");
    Ok(Json(updated))
}

pub async fn delete(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    load_owned(&state, &caller, &id).await?;
    workflow::delete_workflow(state.db.pool(), &id).await?;
    info!(workflow_id = %id, "Deleted workflow");
    Ok(StatusCode::NO_CONTENT)
}

/// Flip the active flag.
pub async fn toggle(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Workflow>> {
    let current = load_owned(&state, &caller, &id).await?;
    let updated = workflow::set_workflow_active(state.db.pool(), &id, !current.is_active).await?;
    info!(workflow_id = %id, is_active = updated.is_active, "Toggled workflow");
    Ok(Json(updated))
}

pub async fn executions(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<ExecutionsQuery>,
) -> Result<Json<Vec<WorkflowExecution>>> {
    load_owned(&state, &caller, &id).await?;
    let limit = query.limit.unwrap_or(50);
    Ok(Json(execution::list_executions(state.db.pool(), &id, limit).await?))
}

/// One execution with its step audit trail.
pub async fn execution(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ExecutionDetail>> {
    let run = execution::get_execution(state.db.pool(), &id).await?;
    let owner = workflow::get_workflow(state.db.pool(), &run.workflow_id).await?;
    caller.ensure_access(
        "WorkflowExecution",
        &id,
        &owner.user_id,
        owner.organization_id.as_deref(),
    )?;

    let steps = execution::list_steps(state.db.pool(), &id).await?;
    Ok(Json(ExecutionDetail {
        execution: run,
        steps,
    }))
}

async fn load_owned(state: &AppState, caller: &AuthUser, id: &str) -> Result<Workflow> {
    let stored = workflow::get_workflow(state.db.pool(), id).await?;
    caller.ensure_access("Workflow", id, &stored.user_id, stored.organization_id.as_deref())?;
    Ok(stored)
}
