//! User segments defined by read-only SQL over the event store.
//!
//! Segment queries go through a keyword guard before execution: they must
//! start with `SELECT` or `WITH`, may not contain write or schema keywords
//! and may not name a schema. The compiled statement may then only open
//! the `events` table, which is shadowed by a view of the owner's
//! organization. Results are capped at [`MAX_SEGMENT_ROWS`] rows and the
//! query runs under [`SEGMENT_QUERY_TIMEOUT`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::types::Json;
use sqlx::{Row, SqlitePool};

use crate::error::{DatabaseError, Result};
use crate::models::{Owner, UserSegment};
use crate::validation::validate_name;

/// Row cap applied to every segment query.
pub const MAX_SEGMENT_ROWS: usize = 10_000;

/// Time budget for a segment query.
pub const SEGMENT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Keywords that reject a query outright (matched as whole words, any case).
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "UPDATE", "INSERT", "CREATE", "ALTER", "TRUNCATE", "ATTACH", "DETACH",
    "PRAGMA", "VACUUM", "REINDEX",
];

/// The only table a segment query can read.
pub const SEGMENT_TABLE: &str = "events";

/// Opcodes that open a b-tree cursor on their `p2` root page.
const CURSOR_OPCODES: &[&str] = &["OpenRead", "OpenWrite", "ReopenIdx"];

const SEGMENT_COLUMNS: &str = "id, name, description, query, criteria, user_count, user_id, \
     organization_id, created_at, updated_at";

/// Request to create a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSegment {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub query: String,
    #[serde(default)]
    pub criteria: Value,
}

/// Result of running a segment query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentResult {
    /// Values of the first column, rendered as strings.
    pub user_ids: Vec<String>,
    /// Number of rows returned.
    pub count: i64,
}

/// Check a segment query against the guard and return it normalized.
pub fn validate_segment_query(query: &str) -> Result<String> {
    let normalized = query.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace());

    if normalized.is_empty() {
        return Err(rejected("query is empty"));
    }
    if normalized.contains(';') {
        return Err(rejected("only a single statement is allowed"));
    }
    if normalized.contains("--") || normalized.contains("/*") {
        return Err(rejected("comments are not allowed"));
    }

    let words: Vec<String> = words(normalized).map(|w| w.to_ascii_uppercase()).collect();

    match words.first().map(String::as_str) {
        Some("SELECT") | Some("WITH") => {}
        _ => return Err(rejected("query must start with SELECT or WITH")),
    }

    if let Some(keyword) = words
        .iter()
        .find(|w| FORBIDDEN_KEYWORDS.contains(&w.as_str()))
    {
        return Err(rejected(&format!("{keyword} statements are not allowed")));
    }

    if names_schema(normalized) {
        return Err(rejected("schema-qualified names are not allowed"));
    }

    Ok(normalized.to_string())
}

/// Shadow `events` with the rows of one organization.
///
/// Binds one parameter: the organization id, `NULL` for events tracked
/// without one.
pub fn scope_query(query: &str) -> String {
    format!(
        "WITH {SEGMENT_TABLE} AS (SELECT * FROM main.{SEGMENT_TABLE} WHERE organization_id IS ?) \
         SELECT * FROM ({query})"
    )
}

/// Compile `sql` without running it and reject it when it opens anything
/// besides the `events` table and its indexes.
async fn ensure_reads_events_only(pool: &SqlitePool, sql: &str, organization_id: Option<&str>) -> Result<()> {
    let allowed: Vec<i64> = sqlx::query_scalar("SELECT rootpage FROM sqlite_master WHERE tbl_name = ?")
        .bind(SEGMENT_TABLE)
        .fetch_all(pool)
        .await?;

    let program = sqlx::query(&format!("EXPLAIN {sql}"))
        .bind(organization_id)
        .fetch_all(pool)
        .await?;

    for instruction in &program {
        let opcode: String = instruction.try_get("opcode")?;
        if opcode == "VOpen" {
            return Err(rejected("virtual tables are not allowed"));
        }
        if CURSOR_OPCODES.contains(&opcode.as_str()) {
            let root: i64 = instruction.try_get("p2")?;
            let schema: i64 = instruction.try_get("p3")?;
            if schema != 0 || !allowed.contains(&root) {
                return Err(rejected(&format!("only the {SEGMENT_TABLE} table can be queried")));
            }
        }
    }

    Ok(())
}

/// Apply the row cap: append a `LIMIT` when absent, otherwise wrap the query.
pub fn limit_query(query: &str) -> String {
    let has_limit = words(query).any(|w| w.eq_ignore_ascii_case("LIMIT"));

    if has_limit {
        format!("SELECT * FROM ({query}) LIMIT {MAX_SEGMENT_ROWS}")
    } else {
        format!("{query} LIMIT {MAX_SEGMENT_ROWS}")
    }
}

/// Run a guarded segment query over one organization's events and collect
/// the first column of each row.
pub async fn execute_segment_query(
    pool: &SqlitePool,
    query: &str,
    organization_id: Option<&str>,
) -> Result<SegmentResult> {
    let sql = scope_query(&limit_query(&validate_segment_query(query)?));
    ensure_reads_events_only(pool, &sql, organization_id).await?;
    tracing::debug!(sql = %sql, organization_id, "Executing segment query");

    let query = sqlx::query(&sql).bind(organization_id);
    let rows = tokio::time::timeout(SEGMENT_QUERY_TIMEOUT, query.fetch_all(pool))
        .await
        .map_err(|_| DatabaseError::QueryTimeout(SEGMENT_QUERY_TIMEOUT.as_secs()))??;

    let user_ids = rows.iter().filter_map(first_column).collect();

    Ok(SegmentResult {
        user_ids,
        count: rows.len() as i64,
    })
}

/// Create a segment, capturing the current row count as a snapshot.
pub async fn create_segment(pool: &SqlitePool, owner: &Owner, segment: &NewSegment) -> Result<UserSegment> {
    validate_name("name", &segment.name)?;
    let query = validate_segment_query(&segment.query)?;
    let result = execute_segment_query(pool, &query, owner.organization_id.as_deref()).await?;

    let criteria = match &segment.criteria {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    let id = crate::new_id();

    sqlx::query(
        r#"
        INSERT INTO user_segments (id, name, description, query, criteria, user_count, user_id, organization_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(segment.name.trim())
    .bind(&segment.description)
    .bind(&query)
    .bind(Json(&criteria))
    .bind(result.count)
    .bind(&owner.user_id)
    .bind(&owner.organization_id)
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::from_insert(e, "UserSegment", &segment.name))?;

    tracing::info!(segment_id = %id, user_count = result.count, "Created segment");
    get_segment(pool, &id).await
}

/// Get a segment by ID.
pub async fn get_segment(pool: &SqlitePool, id: &str) -> Result<UserSegment> {
    sqlx::query_as::<_, UserSegment>(&format!(
        "SELECT {SEGMENT_COLUMNS} FROM user_segments WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "UserSegment",
        id: id.to_string(),
    })
}

/// List segments visible to an owner.
pub async fn list_segments(pool: &SqlitePool, owner: &Owner) -> Result<Vec<UserSegment>> {
    let segments = sqlx::query_as::<_, UserSegment>(&format!(
        r#"
        SELECT {SEGMENT_COLUMNS}
        FROM user_segments
        WHERE user_id = ? OR (organization_id IS NOT NULL AND organization_id = ?)
        ORDER BY created_at DESC, name
        "#
    ))
    .bind(&owner.user_id)
    .bind(&owner.organization_id)
    .fetch_all(pool)
    .await?;

    Ok(segments)
}

/// Re-run a segment's query and store the new snapshot count.
pub async fn refresh_segment_count(pool: &SqlitePool, id: &str) -> Result<UserSegment> {
    let segment = get_segment(pool, id).await?;
    let result = execute_segment_query(pool, &segment.query, segment.organization_id.as_deref()).await?;

    sqlx::query(
        r#"
        UPDATE user_segments
        SET user_count = ?, updated_at = datetime('now')
        WHERE id = ?
        "#,
    )
    .bind(result.count)
    .bind(id)
    .execute(pool)
    .await?;

    get_segment(pool, id).await
}

/// Delete a segment.
pub async fn delete_segment(pool: &SqlitePool, id: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        DELETE FROM user_segments
        WHERE id = ?
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "UserSegment",
            id: id.to_string(),
        });
    }

    Ok(())
}

fn words(query: &str) -> impl Iterator<Item = &str> {
    query
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
}

/// Whether the query qualifies a name with `main` or `temp`.
///
/// String literals are skipped so values like `'/main.css'` still pass.
fn names_schema(query: &str) -> bool {
    let bytes = query.as_bytes();
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\'' {
            i += 1;
            while i < bytes.len() && bytes[i] != b'\'' {
                i += 1;
            }
            i += 1;
        } else if is_word(bytes[i]) {
            let start = i;
            while i < bytes.len() && is_word(bytes[i]) {
                i += 1;
            }
            let word = &query[start..i];
            if word.eq_ignore_ascii_case("main") || word.eq_ignore_ascii_case("temp") {
                let mut j = i;
                while j < bytes.len() && (bytes[j].is_ascii_whitespace() || matches!(bytes[j], b'"' | b'`' | b']')) {
                    j += 1;
                }
                if bytes.get(j) == Some(&b'.') {
                    return true;
                }
            }
        } else {
            i += 1;
        }
    }

    false
}

fn first_column(row: &SqliteRow) -> Option<String> {
    if let Ok(value) = row.try_get::<Option<String>, _>(0) {
        return value;
    }
    if let Ok(value) = row.try_get::<Option<i64>, _>(0) {
        return value.map(|v| v.to_string());
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(0) {
        return value.map(|v| v.to_string());
    }
    None
}

fn rejected(reason: &str) -> DatabaseError {
    DatabaseError::QueryRejected(reason.to_string())
}
