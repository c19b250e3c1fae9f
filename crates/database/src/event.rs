//! Event store. Events are append-only: there is no update or delete.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::error::{DatabaseError, Result};
use crate::models::{Event, NewEvent};
use crate::validation::validate_name;

/// Upper bound for a single listing.
pub const MAX_LIST_LIMIT: i64 = 1000;

const EVENT_COLUMNS: &str = "id, name, category, properties, user_id, organization_id, timestamp, \
     path, action, value, item_name, item_id, item_category";

/// Filters for listing events. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventFilter {
    pub name: Option<String>,
    pub category: Option<String>,
    pub user_id: Option<String>,
    pub organization_id: Option<String>,
    pub limit: Option<i64>,
}

/// Store a new event and return it as persisted.
pub async fn insert_event(pool: &SqlitePool, event: &NewEvent) -> Result<Event> {
    validate_name("name", &event.name)?;
    validate_name("category", &event.category)?;

    let id = crate::new_id();
    let properties = match &event.properties {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };

    sqlx::query(
        r#"
        INSERT INTO events (
            id, name, category, properties, user_id, organization_id, timestamp,
            path, action, value, item_name, item_id, item_category
        )
        VALUES (?, ?, ?, ?, ?, ?, COALESCE(?, datetime('now')), ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(event.name.trim())
    .bind(event.category.trim())
    .bind(Json(&properties))
    .bind(&event.user_id)
    .bind(&event.organization_id)
    .bind(&event.timestamp)
    .bind(&event.path)
    .bind(&event.action)
    .bind(event.value)
    .bind(&event.item_name)
    .bind(&event.item_id)
    .bind(&event.item_category)
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::from_insert(e, "Event", &id))?;

    get_event(pool, &id).await
}

/// Get an event by ID.
pub async fn get_event(pool: &SqlitePool, id: &str) -> Result<Event> {
    sqlx::query_as::<_, Event>(&format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "Event",
        id: id.to_string(),
    })
}

/// List events matching a filter, newest first.
pub async fn list_events(pool: &SqlitePool, filter: &EventFilter) -> Result<Vec<Event>> {
    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {EVENT_COLUMNS} FROM events WHERE 1 = 1"));

    if let Some(name) = &filter.name {
        builder.push(" AND name = ").push_bind(name);
    }
    if let Some(category) = &filter.category {
        builder.push(" AND category = ").push_bind(category);
    }
    if let Some(user_id) = &filter.user_id {
        builder.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(organization_id) = &filter.organization_id {
        builder
            .push(" AND organization_id = ")
            .push_bind(organization_id);
    }

    let limit = filter.limit.unwrap_or(100).clamp(1, MAX_LIST_LIMIT);
    builder
        .push(" ORDER BY timestamp DESC, rowid DESC LIMIT ")
        .push_bind(limit);

    let events = builder.build_query_as::<Event>().fetch_all(pool).await?;
    Ok(events)
}

/// Count events grouped by category.
pub async fn count_events_by_category(
    pool: &SqlitePool,
    organization_id: Option<&str>,
) -> Result<Vec<(String, i64)>> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        r#"
        SELECT category, COUNT(*) as count
        FROM events
        WHERE ? IS NULL OR organization_id = ?
        GROUP BY category
        ORDER BY count DESC
        "#,
    )
    .bind(organization_id)
    .bind(organization_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_db;
    use serde_json::json;

    fn page_view(user: &str) -> NewEvent {
        NewEvent {
            name: "page_view".to_string(),
            category: "engagement".to_string(),
            properties: json!({"plan": "pro"}),
            user_id: Some(user.to_string()),
            organization_id: Some("org-1".to_string()),
            path: Some("/pricing".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_insert_event_defaults() {
        let db = test_db().await;

        let stored = insert_event(db.pool(), &page_view("u1")).await.unwrap();
        assert_eq!(stored.name, "page_view");
        assert_eq!(stored.properties.0["plan"], "pro");
        assert!(!stored.timestamp.is_empty());
        assert_eq!(stored.value, None);

        let no_props = insert_event(
            db.pool(),
            &NewEvent {
                name: "signup".to_string(),
                category: "conversion".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(no_props.properties.0, json!({}));
    }

    #[tokio::test]
    async fn test_insert_event_requires_name() {
        let db = test_db().await;

        let result = insert_event(
            db.pool(),
            &NewEvent {
                category: "engagement".to_string(),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(result, Err(DatabaseError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_list_events_filters() {
        let db = test_db().await;

        insert_event(db.pool(), &page_view("u1")).await.unwrap();
        insert_event(db.pool(), &page_view("u2")).await.unwrap();
        insert_event(
            db.pool(),
            &NewEvent {
                name: "purchase".to_string(),
                category: "conversion".to_string(),
                user_id: Some("u1".to_string()),
                value: Some(49.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let all = list_events(db.pool(), &EventFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].name, "purchase");

        let by_user = list_events(
            db.pool(),
            &EventFilter {
                user_id: Some("u1".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(by_user.len(), 2);

        let limited = list_events(
            db.pool(),
            &EventFilter {
                category: Some("engagement".to_string()),
                limit: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(limited.len(), 1);

        let counts = count_events_by_category(db.pool(), None).await.unwrap();
        assert_eq!(counts[0], ("engagement".to_string(), 2));
    }
}
