//! Browser push subscription storage.

use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::error::{DatabaseError, Result};
use crate::models::PushSubscription;
use crate::validation::{validate_required, validate_url};

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, organization_id, endpoint, p256dh, auth, created_at";

/// Subscription payload as sent by the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubscription {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
}

/// Insert a subscription, or refresh keys and owner if the endpoint is known.
pub async fn upsert_subscription(pool: &SqlitePool, sub: &NewSubscription) -> Result<PushSubscription> {
    validate_url(&sub.endpoint)?;
    validate_required("p256dh", &sub.p256dh, 512)?;
    validate_required("auth", &sub.auth, 256)?;

    sqlx::query(
        r#"
        INSERT INTO push_subscriptions (id, user_id, organization_id, endpoint, p256dh, auth)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(endpoint) DO UPDATE SET
            user_id = COALESCE(excluded.user_id, push_subscriptions.user_id),
            organization_id = COALESCE(excluded.organization_id, push_subscriptions.organization_id),
            p256dh = excluded.p256dh,
            auth = excluded.auth
        "#,
    )
    .bind(crate::new_id())
    .bind(&sub.user_id)
    .bind(&sub.organization_id)
    .bind(sub.endpoint.trim())
    .bind(&sub.p256dh)
    .bind(&sub.auth)
    .execute(pool)
    .await?;

    sqlx::query_as::<_, PushSubscription>(&format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM push_subscriptions WHERE endpoint = ?"
    ))
    .bind(sub.endpoint.trim())
    .fetch_one(pool)
    .await
    .map_err(DatabaseError::from)
}

/// List an organization's subscriptions.
pub async fn list_subscriptions(pool: &SqlitePool, organization_id: &str) -> Result<Vec<PushSubscription>> {
    let subscriptions = sqlx::query_as::<_, PushSubscription>(&format!(
        r#"
        SELECT {SUBSCRIPTION_COLUMNS}
        FROM push_subscriptions
        WHERE organization_id = ?
        ORDER BY created_at, rowid
        "#
    ))
    .bind(organization_id)
    .fetch_all(pool)
    .await?;

    Ok(subscriptions)
}

/// List subscriptions belonging to any of the given users.
pub async fn list_subscriptions_for_users(
    pool: &SqlitePool,
    user_ids: &[String],
) -> Result<Vec<PushSubscription>> {
    if user_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM push_subscriptions WHERE user_id IN ("
    ));
    let mut separated = builder.separated(", ");
    for user_id in user_ids {
        separated.push_bind(user_id);
    }
    separated.push_unseparated(") ORDER BY created_at, rowid");

    let subscriptions = builder
        .build_query_as::<PushSubscription>()
        .fetch_all(pool)
        .await?;

    Ok(subscriptions)
}

/// Delete a subscription by ID.
pub async fn delete_subscription(pool: &SqlitePool, id: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        DELETE FROM push_subscriptions
        WHERE id = ?
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "PushSubscription",
            id: id.to_string(),
        });
    }

    Ok(())
}

/// Remove subscriptions the push service reported as gone.
pub async fn prune_endpoints(pool: &SqlitePool, endpoints: &[String]) -> Result<u64> {
    if endpoints.is_empty() {
        return Ok(0);
    }

    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("DELETE FROM push_subscriptions WHERE endpoint IN (");
    let mut separated = builder.separated(", ");
    for endpoint in endpoints {
        separated.push_bind(endpoint);
    }
    separated.push_unseparated(")");

    let result = builder.build().execute(pool).await?;
    if result.rows_affected() > 0 {
        tracing::info!(removed = result.rows_affected(), "Pruned expired push subscriptions");
    }
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_db;

    fn sub(endpoint: &str, user: Option<&str>) -> NewSubscription {
        NewSubscription {
            endpoint: endpoint.to_string(),
            p256dh: "BNc...key".to_string(),
            auth: "auth-secret".to_string(),
            user_id: user.map(str::to_string),
            organization_id: Some("org-1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_upsert_by_endpoint() {
        let db = test_db().await;

        let first = upsert_subscription(db.pool(), &sub("https://push.example/a", None))
            .await
            .unwrap();
        assert!(first.user_id.is_none());

        let mut again = sub("https://push.example/a", Some("u1"));
        again.auth = "rotated".to_string();
        let second = upsert_subscription(db.pool(), &again).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.user_id.as_deref(), Some("u1"));
        assert_eq!(second.auth, "rotated");

        assert_eq!(list_subscriptions(db.pool(), "org-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_for_users() {
        let db = test_db().await;
        upsert_subscription(db.pool(), &sub("https://push.example/a", Some("u1"))).await.unwrap();
        upsert_subscription(db.pool(), &sub("https://push.example/b", Some("u2"))).await.unwrap();
        upsert_subscription(db.pool(), &sub("https://push.example/c", None)).await.unwrap();

        let subs = list_subscriptions_for_users(db.pool(), &["u2".to_string(), "u9".to_string()])
            .await
            .unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].endpoint, "https://push.example/b");

        assert!(list_subscriptions_for_users(db.pool(), &[]).await.unwrap().is_empty());
        assert_eq!(list_subscriptions(db.pool(), "org-1").await.unwrap().len(), 3);
        assert!(list_subscriptions(db.pool(), "org-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_subscription() {
        let db = test_db().await;
        let s = upsert_subscription(db.pool(), &sub("https://push.example/a", None)).await.unwrap();
        delete_subscription(db.pool(), &s.id).await.unwrap();
        assert!(matches!(
            delete_subscription(db.pool(), &s.id).await,
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_prune_endpoints() {
        let db = test_db().await;
        upsert_subscription(db.pool(), &sub("https://push.example/a", None)).await.unwrap();
        upsert_subscription(db.pool(), &sub("https://push.example/b", None)).await.unwrap();

        let removed = prune_endpoints(db.pool(), &["https://push.example/a".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(prune_endpoints(db.pool(), &[]).await.unwrap(), 0);
        assert_eq!(list_subscriptions(db.pool(), "org-1").await.unwrap().len(), 1);
    }
}
