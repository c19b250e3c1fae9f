//! Workflow execution audit trail.
//!
//! An execution starts as `running` and moves exactly once to `completed`
//! or `failed`. Steps are appended in action order and never rewritten.

use serde_json::Value;
use sqlx::types::Json;
use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::{ExecutionStatus, StepStatus, WorkflowExecution, WorkflowExecutionStep};

const EXECUTION_COLUMNS: &str =
    "id, workflow_id, event_id, status, results, error, started_at, completed_at";

const STEP_COLUMNS: &str =
    "id, execution_id, step_order, action_type, status, output, error, created_at";

/// Open a new `running` execution for a workflow.
pub async fn start_execution(
    pool: &SqlitePool,
    workflow_id: &str,
    event_id: Option<&str>,
) -> Result<WorkflowExecution> {
    let id = crate::new_id();

    sqlx::query(
        r#"
        INSERT INTO workflow_executions (id, workflow_id, event_id, status)
        VALUES (?, ?, ?, 'running')
        "#,
    )
    .bind(&id)
    .bind(workflow_id)
    .bind(event_id)
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::from_insert(e, "WorkflowExecution", &id))?;

    get_execution(pool, &id).await
}

/// Append a step record to an execution.
pub async fn record_step(
    pool: &SqlitePool,
    execution_id: &str,
    step_order: i64,
    action_type: &str,
    status: StepStatus,
    output: Option<&Value>,
    error: Option<&str>,
) -> Result<WorkflowExecutionStep> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO workflow_execution_steps (execution_id, step_order, action_type, status, output, error)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(execution_id)
    .bind(step_order)
    .bind(action_type)
    .bind(status.as_str())
    .bind(output.map(Json))
    .bind(error)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        DatabaseError::from_insert(e, "WorkflowExecutionStep", &format!("{execution_id}#{step_order}"))
    })?;

    sqlx::query_as::<_, WorkflowExecutionStep>(&format!(
        "SELECT {STEP_COLUMNS} FROM workflow_execution_steps WHERE id = ?"
    ))
    .bind(id)
    .fetch_one(pool)
    .await
    .map_err(DatabaseError::from)
}

/// Mark a running execution as completed.
pub async fn complete_execution(
    pool: &SqlitePool,
    id: &str,
    results: &Value,
) -> Result<WorkflowExecution> {
    finish(pool, id, ExecutionStatus::Completed, results, None).await
}

/// Mark a running execution as failed.
pub async fn fail_execution(
    pool: &SqlitePool,
    id: &str,
    results: &Value,
    error: &str,
) -> Result<WorkflowExecution> {
    finish(pool, id, ExecutionStatus::Failed, results, Some(error)).await
}

async fn finish(
    pool: &SqlitePool,
    id: &str,
    status: ExecutionStatus,
    results: &Value,
    error: Option<&str>,
) -> Result<WorkflowExecution> {
    let result = sqlx::query(
        r#"
        UPDATE workflow_executions
        SET status = ?, results = ?, error = ?, completed_at = datetime('now')
        WHERE id = ? AND status = 'running'
        "#,
    )
    .bind(status.as_str())
    .bind(Json(results))
    .bind(error)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        // Distinguish a missing row from an already-terminal one.
        get_execution(pool, id).await?;
        return Err(DatabaseError::ExecutionFinished(id.to_string()));
    }

    get_execution(pool, id).await
}

/// Get an execution by ID.
pub async fn get_execution(pool: &SqlitePool, id: &str) -> Result<WorkflowExecution> {
    sqlx::query_as::<_, WorkflowExecution>(&format!(
        "SELECT {EXECUTION_COLUMNS} FROM workflow_executions WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "WorkflowExecution",
        id: id.to_string(),
    })
}

/// List the steps of an execution in action order.
pub async fn list_steps(pool: &SqlitePool, execution_id: &str) -> Result<Vec<WorkflowExecutionStep>> {
    let steps = sqlx::query_as::<_, WorkflowExecutionStep>(&format!(
        r#"
        SELECT {STEP_COLUMNS}
        FROM workflow_execution_steps
        WHERE execution_id = ?
        ORDER BY step_order
        "#
    ))
    .bind(execution_id)
    .fetch_all(pool)
    .await?;

    Ok(steps)
}

/// List the most recent executions of a workflow.
pub async fn list_executions(
    pool: &SqlitePool,
    workflow_id: &str,
    limit: i64,
) -> Result<Vec<WorkflowExecution>> {
    let executions = sqlx::query_as::<_, WorkflowExecution>(&format!(
        r#"
        SELECT {EXECUTION_COLUMNS}
        FROM workflow_executions
        WHERE workflow_id = ?
        ORDER BY started_at DESC, rowid DESC
        LIMIT ?
        "#
    ))
    .bind(workflow_id)
    .bind(limit.clamp(1, 500))
    .fetch_all(pool)
    .await?;

    Ok(executions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Owner, WorkflowInput};
    use crate::test_support::test_db;
    use crate::workflow::create_workflow;
    use serde_json::json;

    async fn workflow_id(db: &crate::Database) -> String {
        let input = WorkflowInput {
            name: "Audit".to_string(),
            trigger: json!({"eventType": "engagement"}),
            actions: json!([]),
            is_active: true,
        };
        create_workflow(db.pool(), &Owner::new("u", None), &input)
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_execution_lifecycle() {
        let db = test_db().await;
        let wf = workflow_id(&db).await;

        let exec = start_execution(db.pool(), &wf, Some("evt-1")).await.unwrap();
        assert_eq!(exec.status(), ExecutionStatus::Running);
        assert!(exec.completed_at.is_none());

        record_step(
            db.pool(),
            &exec.id,
            0,
            "delay",
            StepStatus::Completed,
            Some(&json!({"delayMs": 1000})),
            None,
        )
        .await
        .unwrap();
        record_step(db.pool(), &exec.id, 1, "sms_message", StepStatus::Failed, None, Some("boom"))
            .await
            .unwrap();

        let failed = fail_execution(db.pool(), &exec.id, &json!({}), "boom").await.unwrap();
        assert_eq!(failed.status(), ExecutionStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert!(failed.completed_at.is_some());

        let steps = list_steps(db.pool(), &exec.id).await.unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].action_type, "delay");
        assert_eq!(steps[0].output.as_ref().unwrap().0["delayMs"], 1000);
        assert_eq!(steps[1].status, "failed");
    }

    #[tokio::test]
    async fn test_terminal_execution_is_not_reopened() {
        let db = test_db().await;
        let wf = workflow_id(&db).await;

        let exec = start_execution(db.pool(), &wf, None).await.unwrap();
        let done = complete_execution(db.pool(), &exec.id, &json!({"promoCode": "X"}))
            .await
            .unwrap();
        assert!(done.status().is_terminal());
        assert!(!exec.status().is_terminal());

        let again = fail_execution(db.pool(), &exec.id, &json!({}), "late").await;
        assert!(matches!(again, Err(DatabaseError::ExecutionFinished(_))));

        let missing = complete_execution(db.pool(), "nope", &json!({})).await;
        assert!(matches!(missing, Err(DatabaseError::NotFound { .. })));

        let listed = list_executions(db.pool(), &wf, 10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status(), ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_duplicate_step_order_rejected() {
        let db = test_db().await;
        let wf = workflow_id(&db).await;
        let exec = start_execution(db.pool(), &wf, None).await.unwrap();

        record_step(db.pool(), &exec.id, 0, "delay", StepStatus::Completed, None, None)
            .await
            .unwrap();
        let dup = record_step(db.pool(), &exec.id, 0, "delay", StepStatus::Completed, None, None).await;
        assert!(matches!(dup, Err(DatabaseError::AlreadyExists { .. })));
    }
}
