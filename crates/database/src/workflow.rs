//! Workflow definition CRUD operations.
//!
//! Workflows are only ever replaced wholesale; there is no partial update.

use sqlx::types::Json;
use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::{Owner, Workflow, WorkflowInput};
use crate::validation::validate_name;

const WORKFLOW_COLUMNS: &str =
    "id, name, trigger_def, actions, is_active, user_id, organization_id, created_at, updated_at";

/// Create a new workflow.
pub async fn create_workflow(
    pool: &SqlitePool,
    owner: &Owner,
    input: &WorkflowInput,
) -> Result<Workflow> {
    validate_name("name", &input.name)?;
    let id = crate::new_id();

    sqlx::query(
        r#"
        INSERT INTO workflows (id, name, trigger_def, actions, is_active, user_id, organization_id)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(input.name.trim())
    .bind(Json(&input.trigger))
    .bind(Json(&input.actions))
    .bind(input.is_active)
    .bind(&owner.user_id)
    .bind(&owner.organization_id)
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::from_insert(e, "Workflow", &id))?;

    get_workflow(pool, &id).await
}

/// Get a workflow by ID.
pub async fn get_workflow(pool: &SqlitePool, id: &str) -> Result<Workflow> {
    sqlx::query_as::<_, Workflow>(&format!(
        "SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "Workflow",
        id: id.to_string(),
    })
}

/// List workflows visible to an owner (their own, or their organization's).
pub async fn list_workflows(pool: &SqlitePool, owner: &Owner) -> Result<Vec<Workflow>> {
    let workflows = sqlx::query_as::<_, Workflow>(&format!(
        r#"
        SELECT {WORKFLOW_COLUMNS}
        FROM workflows
        WHERE user_id = ? OR (organization_id IS NOT NULL AND organization_id = ?)
        ORDER BY created_at DESC, name
        "#
    ))
    .bind(&owner.user_id)
    .bind(&owner.organization_id)
    .fetch_all(pool)
    .await?;

    Ok(workflows)
}

/// List every active workflow, oldest first.
pub async fn list_active_workflows(pool: &SqlitePool) -> Result<Vec<Workflow>> {
    let workflows = sqlx::query_as::<_, Workflow>(&format!(
        r#"
        SELECT {WORKFLOW_COLUMNS}
        FROM workflows
        WHERE is_active = 1
        ORDER BY created_at, rowid
        "#
    ))
    .fetch_all(pool)
    .await?;

    Ok(workflows)
}

/// Replace a workflow's name, trigger, actions and active flag.
pub async fn replace_workflow(pool: &SqlitePool, id: &str, input: &WorkflowInput) -> Result<Workflow> {
    validate_name("name", &input.name)?;

    let result = sqlx::query(
        r#"
        UPDATE workflows
        SET name = ?, trigger_def = ?, actions = ?, is_active = ?, updated_at = datetime('now')
        WHERE id = ?
        "#,
    )
    .bind(input.name.trim())
    .bind(Json(&input.trigger))
    .bind(Json(&input.actions))
    .bind(input.is_active)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Workflow",
            id: id.to_string(),
        });
    }

    get_workflow(pool, id).await
}

/// Activate or deactivate a workflow.
pub async fn set_workflow_active(pool: &SqlitePool, id: &str, is_active: bool) -> Result<Workflow> {
    let result = sqlx::query(
        r#"
        UPDATE workflows
        SET is_active = ?, updated_at = datetime('now')
        WHERE id = ?
        "#,
    )
    .bind(is_active)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Workflow",
            id: id.to_string(),
        });
    }

    get_workflow(pool, id).await
}

/// Delete a workflow and, by cascade, its executions.
pub async fn delete_workflow(pool: &SqlitePool, id: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        DELETE FROM workflows
        WHERE id = ?
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Workflow",
            id: id.to_string(),
        });
    }

    Ok(())
}
