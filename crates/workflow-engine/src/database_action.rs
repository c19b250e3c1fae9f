//! Constrained database access for `database` actions.
//!
//! Only allow-listed tables and columns can be read, always within the
//! running workflow's organization. Writes are limited to appending events.
//! Every statement is built with bound parameters.

use database::event::insert_event;
use database::{DatabaseError, NewEvent};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::actions::DatabaseAction;
use crate::error::{EngineError, Result};

/// Rows returned by a single `find`.
pub const MAX_FIND_ROWS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseOperation {
    Find,
    Count,
    Create,
}

/// How rows of a table are tied to an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// The row carries `organization_id` itself.
    Column,
    /// The row belongs to a promo code batch that carries it.
    Batch,
}

struct AllowedTable {
    name: &'static str,
    columns: &'static [&'static str],
    scope: Scope,
}

const TABLES: &[AllowedTable] = &[
    AllowedTable {
        name: "events",
        columns: &[
            "id", "name", "category", "user_id", "organization_id", "timestamp", "path", "action",
            "value", "item_name", "item_id", "item_category",
        ],
        scope: Scope::Column,
    },
    AllowedTable {
        name: "promo_codes",
        columns: &["id", "batch_id", "code", "is_used", "used_at", "used_by"],
        scope: Scope::Batch,
    },
    AllowedTable {
        name: "push_subscriptions",
        columns: &["id", "user_id", "organization_id", "created_at"],
        scope: Scope::Column,
    },
    AllowedTable {
        name: "campaigns",
        columns: &[
            "id", "name", "status", "sent_count", "click_count", "close_count", "organization_id",
            "sent_at",
        ],
        scope: Scope::Column,
    },
];

fn allowed_table(name: &str) -> Option<&'static AllowedTable> {
    let normalized = camel_to_snake(name);
    TABLES.iter().find(|t| t.name == normalized)
}

fn column<'a>(table: &'a AllowedTable, name: &str) -> std::result::Result<&'a str, String> {
    let normalized = camel_to_snake(name);
    table
        .columns
        .iter()
        .find(|c| **c == normalized)
        .copied()
        .ok_or_else(|| format!("column {name} is not available on {}", table.name))
}

impl DatabaseAction {
    pub fn validate(&self) -> std::result::Result<(), String> {
        let table = allowed_table(&self.table).ok_or_else(|| format!("table {} is not allowed", self.table))?;
        for key in self.filters.keys() {
            column(table, key)?;
        }
        if self.operation == DatabaseOperation::Create && table.name != "events" {
            return Err("create is only allowed on events".to_string());
        }
        Ok(())
    }
}

/// Run a database action whose filters and data are already resolved.
///
/// Reads need an organization. Created events always carry the run's
/// organization, whatever `data` says.
pub async fn run(
    pool: &SqlitePool,
    action: &DatabaseAction,
    filters: &Map<String, Value>,
    data: &Map<String, Value>,
    organization_id: Option<&str>,
) -> Result<Value> {
    action.validate().map_err(EngineError::DatabaseAction)?;
    let table = allowed_table(&action.table)
        .ok_or_else(|| EngineError::DatabaseAction(format!("table {} is not allowed", action.table)))?;

    let scoped_to = || organization_id.ok_or(EngineError::MissingOrganization { action: "database" });

    match action.operation {
        DatabaseOperation::Find => {
            let limit = action.limit.unwrap_or(MAX_FIND_ROWS).clamp(1, MAX_FIND_ROWS);
            let object = table
                .columns
                .iter()
                .map(|c| format!("'{}', {c}", snake_to_camel(c)))
                .collect::<Vec<_>>()
                .join(", ");

            let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT json_object({object}) FROM {}", table.name));
            push_where(&mut builder, table, filters, scoped_to()?)?;
            builder.push(" ORDER BY rowid DESC LIMIT ");
            builder.push_bind(i64::from(limit));

            let rows = builder
                .build_query_scalar::<String>()
                .fetch_all(pool)
                .await
                .map_err(DatabaseError::from)?;
            let rows = rows
                .iter()
                .map(|row| serde_json::from_str::<Value>(row))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(Value::Array(rows))
        }
        DatabaseOperation::Count => {
            let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM {}", table.name));
            push_where(&mut builder, table, filters, scoped_to()?)?;
            let count = builder
                .build_query_scalar::<i64>()
                .fetch_one(pool)
                .await
                .map_err(DatabaseError::from)?;
            Ok(Value::from(count))
        }
        DatabaseOperation::Create => {
            let mut event: NewEvent = serde_json::from_value(Value::Object(data.clone()))?;
            event.organization_id = organization_id.map(str::to_string);
            let stored = insert_event(pool, &event).await?;
            Ok(serde_json::to_value(stored)?)
        }
    }
}

fn push_where(
    builder: &mut QueryBuilder<'_, Sqlite>,
    table: &AllowedTable,
    filters: &Map<String, Value>,
    organization_id: &str,
) -> Result<()> {
    match table.scope {
        Scope::Column => {
            builder.push(" WHERE organization_id = ");
            builder.push_bind(organization_id.to_string());
        }
        Scope::Batch => {
            builder.push(" WHERE batch_id IN (SELECT id FROM promo_code_batches WHERE organization_id = ");
            builder.push_bind(organization_id.to_string());
            builder.push(")");
        }
    }

    for (key, value) in filters {
        let col = column(table, key).map_err(EngineError::DatabaseAction)?;
        builder.push(" AND ");
        match value {
            Value::Null => {
                builder.push(format!("{col} IS NULL"));
            }
            Value::Bool(b) => {
                builder.push(format!("{col} = "));
                builder.push_bind(*b);
            }
            Value::Number(n) => {
                builder.push(format!("{col} = "));
                builder.push_bind(n.as_f64().unwrap_or_default());
            }
            Value::String(s) => {
                builder.push(format!("{col} = "));
                builder.push_bind(s.clone());
            }
            other => {
                return Err(EngineError::DatabaseAction(format!(
                    "filter {key} must be a scalar, got {other}"
                )))
            }
        }
    }

    Ok(())
}

fn camel_to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn snake_to_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        match (c, upper) {
            ('_', _) => upper = true,
            (c, true) => {
                out.push(c.to_ascii_uppercase());
                upper = false;
            }
            (c, false) => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use database::promo_code::{self, NewBatch};
    use database::{Database, Owner};
    use serde_json::json;

    async fn db_with_events() -> Database {
        let db = Database::connect_with_pool_size("sqlite::memory:", 1).await.unwrap();
        db.migrate().await.unwrap();
        for (name, org) in [("page_view", "org-1"), ("page_view", "org-1"), ("purchase", "org-1"), ("page_view", "org-2")] {
            insert_event(
                db.pool(),
                &NewEvent {
                    name: name.to_string(),
                    category: "engagement".to_string(),
                    organization_id: Some(org.to_string()),
                    user_id: Some("visitor-1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }
        db
    }

    fn action(value: Value) -> DatabaseAction {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_count_scoped_to_organization() {
        let db = db_with_events().await;
        let count = action(json!({ "operation": "count", "table": "events", "filters": { "name": "page_view" } }));

        let scoped = run(db.pool(), &count, &count.filters, &Map::new(), Some("org-1")).await.unwrap();
        assert_eq!(scoped, json!(2));
        let other = run(db.pool(), &count, &count.filters, &Map::new(), Some("org-2")).await.unwrap();
        assert_eq!(other, json!(1));
        let unscoped = run(db.pool(), &count, &count.filters, &Map::new(), None).await;
        assert!(matches!(unscoped, Err(EngineError::MissingOrganization { action: "database" })));
    }

    #[tokio::test]
    async fn test_promo_codes_scoped_through_batch() {
        let db = db_with_events().await;
        for (user, org, count) in [("user-1", "org-1", 2), ("user-2", "org-2", 3)] {
            promo_code::create_batch(
                db.pool(),
                &Owner::new(user, Some(org.to_string())),
                &NewBatch {
                    name: format!("{org} batch"),
                    description: None,
                    discount_type: "percentage".to_string(),
                    discount_value: 10.0,
                    prefix: None,
                    valid_from: None,
                    valid_until: None,
                    count,
                    code_length: 8,
                },
            )
            .await
            .unwrap();
        }

        let find = action(json!({ "operation": "find", "table": "promoCodes", "filters": { "isUsed": false } }));
        let rows = run(db.pool(), &find, &find.filters, &Map::new(), Some("org-1")).await.unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 2);

        let count = action(json!({ "operation": "count", "table": "promo_codes" }));
        let other = run(db.pool(), &count, &count.filters, &Map::new(), Some("org-2")).await.unwrap();
        assert_eq!(other, json!(3));
    }

    #[tokio::test]
    async fn test_find_returns_camel_case_rows() {
        let db = db_with_events().await;
        let find = action(json!({ "operation": "find", "table": "events", "filters": { "userId": "visitor-1" }, "limit": 2 }));

        let rows = run(db.pool(), &find, &find.filters, &Map::new(), Some("org-1")).await.unwrap();
        let rows = rows.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "purchase");
        assert_eq!(rows[0]["organizationId"], "org-1");
        assert!(rows[0].get("properties").is_none());
    }

    #[tokio::test]
    async fn test_create_appends_event() {
        let db = db_with_events().await;
        let create = action(json!({
            "operation": "create",
            "table": "events",
            "data": { "name": "workflow_fired", "category": "automation", "properties": { "source": "wf" } }
        }));

        let stored = run(db.pool(), &create, &Map::new(), &create.data, Some("org-3")).await.unwrap();
        assert_eq!(stored["organizationId"], "org-3");
        assert_eq!(stored["properties"]["source"], "wf");
    }

    #[tokio::test]
    async fn test_create_ignores_organization_in_data() {
        let db = db_with_events().await;
        let create = action(json!({
            "operation": "create",
            "table": "events",
            "data": { "name": "workflow_fired", "category": "automation", "organizationId": "org-1" }
        }));

        let stored = run(db.pool(), &create, &Map::new(), &create.data, None).await.unwrap();
        assert!(stored["organizationId"].is_null());
    }

    #[test]
    fn test_validation_rejects_unknown_tables_and_columns() {
        assert!(action(json!({ "operation": "find", "table": "integration_credentials" })).validate().is_err());
        assert!(action(json!({ "operation": "find", "table": "push_subscriptions", "filters": { "auth": "x" } }))
            .validate()
            .is_err());
        assert!(action(json!({ "operation": "create", "table": "campaigns" })).validate().is_err());
        assert!(action(json!({ "operation": "count", "table": "promoCodes", "filters": { "isUsed": false } }))
            .validate()
            .is_ok());
    }
}
