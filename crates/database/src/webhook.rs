//! Outbound webhook registrations.

use rand::RngCore;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::{Owner, Webhook};
use crate::validation::validate_url;

const WEBHOOK_COLUMNS: &str =
    "id, user_id, organization_id, url, events, secret, is_active, created_at";

/// Register a webhook. A fresh 32-byte hex signing secret is generated.
pub async fn create_webhook(
    pool: &SqlitePool,
    owner: &Owner,
    url: &str,
    events: &[String],
) -> Result<Webhook> {
    validate_url(url)?;
    let id = crate::new_id();
    let secret = generate_secret();
    let events = Value::from(events.to_vec());

    sqlx::query(
        r#"
        INSERT INTO webhooks (id, user_id, organization_id, url, events, secret)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&owner.user_id)
    .bind(&owner.organization_id)
    .bind(url.trim())
    .bind(Json(&events))
    .bind(&secret)
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::from_insert(e, "Webhook", &id))?;

    get_webhook(pool, &id).await
}

/// Get a webhook by ID.
pub async fn get_webhook(pool: &SqlitePool, id: &str) -> Result<Webhook> {
    sqlx::query_as::<_, Webhook>(&format!("SELECT {WEBHOOK_COLUMNS} FROM webhooks WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "Webhook",
            id: id.to_string(),
        })
}

/// List webhooks visible to an owner.
pub async fn list_webhooks(pool: &SqlitePool, owner: &Owner) -> Result<Vec<Webhook>> {
    let webhooks = sqlx::query_as::<_, Webhook>(&format!(
        r#"
        SELECT {WEBHOOK_COLUMNS}
        FROM webhooks
        WHERE user_id = ? OR (organization_id IS NOT NULL AND organization_id = ?)
        ORDER BY created_at DESC
        "#
    ))
    .bind(&owner.user_id)
    .bind(&owner.organization_id)
    .fetch_all(pool)
    .await?;

    Ok(webhooks)
}

/// Delete a webhook.
pub async fn delete_webhook(pool: &SqlitePool, id: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM webhooks WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Webhook",
            id: id.to_string(),
        });
    }

    Ok(())
}

fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_db;

    #[tokio::test]
    async fn test_webhook_secret_and_crud() {
        let db = test_db().await;
        let owner = Owner::new("user-1", None);

        let a = create_webhook(db.pool(), &owner, "https://hooks.example/a", &["purchase".to_string()])
            .await
            .unwrap();
        let b = create_webhook(db.pool(), &owner, "https://hooks.example/b", &[])
            .await
            .unwrap();

        assert_eq!(a.secret.len(), 64);
        assert!(a.secret.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a.secret, b.secret);
        assert_eq!(a.events.0, serde_json::json!(["purchase"]));

        assert_eq!(list_webhooks(db.pool(), &owner).await.unwrap().len(), 2);
        delete_webhook(db.pool(), &a.id).await.unwrap();
        assert_eq!(list_webhooks(db.pool(), &owner).await.unwrap().len(), 1);

        let bad = create_webhook(db.pool(), &owner, "not a url", &[]).await;
        assert!(matches!(bad, Err(DatabaseError::Invalid(_))));
    }
}
