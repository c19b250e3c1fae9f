//! Push campaign CRUD and engagement counters.

use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::{Campaign, CampaignInput, Owner};
use crate::validation::{validate_name, validate_required, validate_url, MAX_TEXT_LENGTH};

const CAMPAIGN_COLUMNS: &str = "id, name, title, body, url, segment_id, status, sent_count, \
     click_count, close_count, user_id, organization_id, sent_at, created_at, updated_at";

fn validate_input(input: &CampaignInput) -> Result<()> {
    validate_name("name", &input.name)?;
    validate_required("title", &input.title, 256)?;
    validate_required("body", &input.body, MAX_TEXT_LENGTH)?;
    if let Some(url) = &input.url {
        validate_url(url)?;
    }
    Ok(())
}

/// Create a draft campaign.
pub async fn create_campaign(pool: &SqlitePool, owner: &Owner, input: &CampaignInput) -> Result<Campaign> {
    validate_input(input)?;
    let id = crate::new_id();

    sqlx::query(
        r#"
        INSERT INTO campaigns (id, name, title, body, url, segment_id, user_id, organization_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(input.name.trim())
    .bind(&input.title)
    .bind(&input.body)
    .bind(&input.url)
    .bind(&input.segment_id)
    .bind(&owner.user_id)
    .bind(&owner.organization_id)
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::from_insert(e, "Campaign", &id))?;

    get_campaign(pool, &id).await
}

/// Get a campaign by ID.
pub async fn get_campaign(pool: &SqlitePool, id: &str) -> Result<Campaign> {
    sqlx::query_as::<_, Campaign>(&format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "Campaign",
            id: id.to_string(),
        })
}

/// List campaigns visible to an owner.
pub async fn list_campaigns(pool: &SqlitePool, owner: &Owner) -> Result<Vec<Campaign>> {
    let campaigns = sqlx::query_as::<_, Campaign>(&format!(
        r#"
        SELECT {CAMPAIGN_COLUMNS}
        FROM campaigns
        WHERE user_id = ? OR (organization_id IS NOT NULL AND organization_id = ?)
        ORDER BY created_at DESC, name
        "#
    ))
    .bind(&owner.user_id)
    .bind(&owner.organization_id)
    .fetch_all(pool)
    .await?;

    Ok(campaigns)
}

/// Replace a campaign's content.
pub async fn update_campaign(pool: &SqlitePool, id: &str, input: &CampaignInput) -> Result<Campaign> {
    validate_input(input)?;

    let result = sqlx::query(
        r#"
        UPDATE campaigns
        SET name = ?, title = ?, body = ?, url = ?, segment_id = ?, updated_at = datetime('now')
        WHERE id = ?
        "#,
    )
    .bind(input.name.trim())
    .bind(&input.title)
    .bind(&input.body)
    .bind(&input.url)
    .bind(&input.segment_id)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Campaign",
            id: id.to_string(),
        });
    }

    get_campaign(pool, id).await
}

/// Delete a campaign.
pub async fn delete_campaign(pool: &SqlitePool, id: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM campaigns WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Campaign",
            id: id.to_string(),
        });
    }

    Ok(())
}

/// Record that a campaign was delivered to `sent_count` subscriptions.
pub async fn mark_sent(pool: &SqlitePool, id: &str, sent_count: i64) -> Result<Campaign> {
    let result = sqlx::query(
        r#"
        UPDATE campaigns
        SET status = 'sent', sent_count = sent_count + ?, sent_at = datetime('now'),
            updated_at = datetime('now')
        WHERE id = ?
        "#,
    )
    .bind(sent_count)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Campaign",
            id: id.to_string(),
        });
    }

    get_campaign(pool, id).await
}

/// Increment the click counter.
pub async fn record_click(pool: &SqlitePool, id: &str) -> Result<()> {
    increment(pool, id, "click_count").await
}

/// Increment the close counter.
pub async fn record_close(pool: &SqlitePool, id: &str) -> Result<()> {
    increment(pool, id, "close_count").await
}

async fn increment(pool: &SqlitePool, id: &str, column: &'static str) -> Result<()> {
    let result = sqlx::query(&format!(
        "UPDATE campaigns SET {column} = {column} + 1 WHERE id = ?"
    ))
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Campaign",
            id: id.to_string(),
        });
    }

    Ok(())
}
