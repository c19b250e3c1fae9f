//! SQLite persistence layer for Beacon.
//!
//! This crate provides async database operations for tracked events,
//! workflows and their execution audit trail, promo codes, integration
//! credentials, segments, push subscriptions, campaigns and webhooks using
//! SQLx with SQLite.
//!
//! # Example
//!
//! ```no_run
//! use database::{Database, models::NewEvent, event};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect and run migrations
//!     let db = Database::connect("sqlite:beacon.db?mode=rwc").await?;
//!     db.migrate().await?;
//!
//!     // Track an event
//!     let new_event = NewEvent {
//!         name: "page_view".to_string(),
//!         category: "engagement".to_string(),
//!         ..Default::default()
//!     };
//!     let stored = event::insert_event(db.pool(), &new_event).await?;
//!     println!("stored {}", stored.id);
//!
//!     Ok(())
//! }
//! ```

pub mod campaign;
pub mod credential;
pub mod error;
pub mod event;
pub mod execution;
pub mod models;
pub mod promo_code;
pub mod push_subscription;
pub mod segment;
pub mod validation;
pub mod webhook;
pub mod workflow;

pub use error::{DatabaseError, Result};
pub use models::{
    Campaign, CampaignInput, Event, ExecutionStatus, IntegrationCredential, NewEvent, Owner,
    PromoCode, PromoCodeBatch, PushSubscription, StepStatus, UserSegment, Webhook, Workflow,
    WorkflowExecution, WorkflowExecutionStep, WorkflowInput,
};
pub use promo_code::ClaimStrategy;
pub use validation::ValidationError;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Shared SQLite pool for every Beacon table.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    const DEFAULT_POOL_SIZE: u32 = 20;

    /// Connect with the default pool size.
    ///
    /// `sqlite:beacon.db?mode=rwc` creates the file when missing;
    /// `sqlite::memory:` gives a throwaway database (pair it with a pool
    /// size of 1 so every query sees the same in-memory file).
    ///
    /// ```no_run
    /// # async fn example() -> database::Result<()> {
    /// let db = database::Database::connect("sqlite:beacon.db?mode=rwc").await?;
    /// db.migrate().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_pool_size(url, Self::DEFAULT_POOL_SIZE).await
    }

    /// Connect with an explicit pool size.
    ///
    /// Connections use WAL journaling and wait on locks instead of failing,
    /// since event tracking and workflow runs write concurrently.
    pub async fn connect_with_pool_size(url: &str, pool_size: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        tracing::info!(url, pool_size, "Connected to database");
        Ok(Self { pool })
    }

    /// Apply pending migrations from `migrations/`.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database schema up to date");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check that the database answers a trivial query.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Wait for in-flight queries and close every connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Generate a new record identifier.
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Database;

    /// In-memory database with migrations applied.
    ///
    /// A single connection keeps every query on the same in-memory file.
    pub async fn test_db() -> Database {
        let db = Database::connect_with_pool_size("sqlite::memory:", 1)
            .await
            .unwrap();
        db.migrate().await.unwrap();
        db
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_db;

    #[tokio::test]
    async fn test_ping() {
        let db = test_db().await;
        db.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_migrations_create_schema() {
        let db = test_db().await;

        let tables = sqlx::query_scalar::<_, String>(
            r#"
            SELECT name FROM sqlite_master
            WHERE type = 'table' AND name NOT LIKE '\_%' ESCAPE '\' AND name NOT LIKE 'sqlite%'
            ORDER BY name
            "#,
        )
        .fetch_all(db.pool())
        .await
        .unwrap();

        for expected in [
            "campaigns",
            "events",
            "integration_credentials",
            "promo_code_batches",
            "promo_codes",
            "push_subscriptions",
            "user_segments",
            "webhooks",
            "workflow_execution_steps",
            "workflow_executions",
            "workflows",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing table {expected}");
        }
    }

    #[tokio::test]
    async fn test_event_roundtrip_through_pool() {
        let db = test_db().await;

        let stored = event::insert_event(
            db.pool(),
            &NewEvent {
                name: "signup".to_string(),
                category: "conversion".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let fetched = event::get_event(db.pool(), &stored.id).await.unwrap();
        assert_eq!(fetched, stored);
    }
}
