//! Promo code batches and single-use code claims.
//!
//! A claim is one conditional `UPDATE ... WHERE is_used = 0 ... RETURNING`
//! statement, so a code marked used is never handed out again, even when
//! several requests claim from the same batch at once.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::{Owner, PromoCode, PromoCodeBatch};
use crate::validation::{validate_name, validate_one_of, ValidationError};

/// Largest batch that can be generated in one request.
pub const MAX_BATCH_SIZE: u32 = 10_000;

/// Code alphabet without easily confused characters (0/O, 1/I/L).
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Storage format for validity timestamps; matches SQLite `datetime('now')`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const BATCH_COLUMNS: &str = "id, name, description, discount_type, discount_value, prefix, \
     valid_from, valid_until, is_active, user_id, organization_id, created_at";

const CODE_COLUMNS: &str = "id, batch_id, code, is_used, used_at, used_by, created_at";

/// Request to create a batch of pre-generated codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBatch {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// `percentage` or `fixed`.
    pub discount_type: String,
    pub discount_value: f64,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub valid_from: Option<String>,
    #[serde(default)]
    pub valid_until: Option<String>,
    /// Number of codes to generate.
    pub count: u32,
    /// Length of the random part of each code.
    #[serde(default = "default_code_length")]
    pub code_length: usize,
}

fn default_code_length() -> usize {
    8
}

/// How to pick a code when claiming from a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "codeType", content = "code", rename_all = "lowercase")]
pub enum ClaimStrategy {
    /// Any unused code.
    Random,
    /// The oldest unused code.
    Sequential,
    /// A named code, which must still be unused.
    Specific(String),
}

/// A successfully claimed code together with its batch parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimedCode {
    pub code: PromoCode,
    pub batch: PromoCodeBatch,
}

/// Create a batch and pre-generate its codes.
pub async fn create_batch(pool: &SqlitePool, owner: &Owner, batch: &NewBatch) -> Result<PromoCodeBatch> {
    validate_name("name", &batch.name)?;
    validate_one_of("discountType", &batch.discount_type, &["percentage", "fixed"])?;

    if !batch.discount_value.is_finite() || batch.discount_value <= 0.0 {
        return Err(invalid("discountValue", "must be a positive number"));
    }
    if batch.discount_type == "percentage" && batch.discount_value > 100.0 {
        return Err(invalid("discountValue", "percentage cannot exceed 100"));
    }
    if batch.count == 0 || batch.count > MAX_BATCH_SIZE {
        return Err(invalid("count", &format!("must be between 1 and {MAX_BATCH_SIZE}")));
    }
    if !(4..=32).contains(&batch.code_length) {
        return Err(invalid("codeLength", "must be between 4 and 32"));
    }

    let valid_from = batch.valid_from.as_deref().map(normalize_timestamp).transpose()?;
    let valid_until = batch.valid_until.as_deref().map(normalize_timestamp).transpose()?;
    if let (Some(from), Some(until)) = (&valid_from, &valid_until) {
        if until <= from {
            return Err(invalid("validUntil", "must be after validFrom"));
        }
    }

    let prefix = batch
        .prefix
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_uppercase);
    let codes = generate_codes(prefix.as_deref(), batch.code_length, batch.count as usize);

    let id = crate::new_id();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO promo_code_batches (
            id, name, description, discount_type, discount_value, prefix,
            valid_from, valid_until, user_id, organization_id
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(batch.name.trim())
    .bind(&batch.description)
    .bind(&batch.discount_type)
    .bind(batch.discount_value)
    .bind(&prefix)
    .bind(&valid_from)
    .bind(&valid_until)
    .bind(&owner.user_id)
    .bind(&owner.organization_id)
    .execute(&mut *tx)
    .await
    .map_err(|e| DatabaseError::from_insert(e, "PromoCodeBatch", &id))?;

    for code in &codes {
        sqlx::query("INSERT INTO promo_codes (batch_id, code) VALUES (?, ?)")
            .bind(&id)
            .bind(code)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    tracing::info!(batch_id = %id, count = codes.len(), "Created promo code batch");
    get_batch(pool, &id).await
}

/// Get a batch by ID.
pub async fn get_batch(pool: &SqlitePool, id: &str) -> Result<PromoCodeBatch> {
    sqlx::query_as::<_, PromoCodeBatch>(&format!(
        "SELECT {BATCH_COLUMNS} FROM promo_code_batches WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "PromoCodeBatch",
        id: id.to_string(),
    })
}

/// List batches visible to an owner.
pub async fn list_batches(pool: &SqlitePool, owner: &Owner) -> Result<Vec<PromoCodeBatch>> {
    let batches = sqlx::query_as::<_, PromoCodeBatch>(&format!(
        r#"
        SELECT {BATCH_COLUMNS}
        FROM promo_code_batches
        WHERE user_id = ? OR (organization_id IS NOT NULL AND organization_id = ?)
        ORDER BY created_at DESC, name
        "#
    ))
    .bind(&owner.user_id)
    .bind(&owner.organization_id)
    .fetch_all(pool)
    .await?;

    Ok(batches)
}

/// List the codes of a batch, optionally only the unused ones.
pub async fn list_codes(pool: &SqlitePool, batch_id: &str, unused_only: bool) -> Result<Vec<PromoCode>> {
    let codes = sqlx::query_as::<_, PromoCode>(&format!(
        r#"
        SELECT {CODE_COLUMNS}
        FROM promo_codes
        WHERE batch_id = ? AND (? = 0 OR is_used = 0)
        ORDER BY id
        "#
    ))
    .bind(batch_id)
    .bind(unused_only)
    .fetch_all(pool)
    .await?;

    Ok(codes)
}

/// Count unused codes in a batch.
pub async fn count_unused(pool: &SqlitePool, batch_id: &str) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM promo_codes WHERE batch_id = ? AND is_used = 0
        "#,
    )
    .bind(batch_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Claim a single code from a batch and mark it used.
pub async fn claim_code(
    pool: &SqlitePool,
    batch_id: &str,
    strategy: &ClaimStrategy,
    used_by: Option<&str>,
) -> Result<ClaimedCode> {
    let batch = get_batch(pool, batch_id).await?;
    ensure_redeemable(&batch, Utc::now())?;

    let claimed = match strategy {
        ClaimStrategy::Random => claim_next(pool, batch_id, "RANDOM()", used_by).await?,
        ClaimStrategy::Sequential => claim_next(pool, batch_id, "id", used_by).await?,
        ClaimStrategy::Specific(code) => claim_specific(pool, batch_id, code, used_by).await?,
    };

    let code = claimed.ok_or_else(|| DatabaseError::Exhausted {
        batch_id: batch_id.to_string(),
    })?;

    tracing::info!(batch_id = %batch_id, code_id = code.id, "Claimed promo code");
    Ok(ClaimedCode { code, batch })
}

/// Redeem a code by its value, wherever it was issued.
pub async fn redeem_code(pool: &SqlitePool, code: &str, used_by: Option<&str>) -> Result<ClaimedCode> {
    let code = code.trim().to_uppercase();

    let batch_id = sqlx::query_scalar::<_, String>(
        r#"
        SELECT batch_id FROM promo_codes
        WHERE code = ?
        ORDER BY is_used, id
        LIMIT 1
        "#,
    )
    .bind(&code)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "PromoCode",
        id: code.clone(),
    })?;

    claim_code(pool, &batch_id, &ClaimStrategy::Specific(code), used_by).await
}

async fn claim_next(
    pool: &SqlitePool,
    batch_id: &str,
    order_by: &'static str,
    used_by: Option<&str>,
) -> Result<Option<PromoCode>> {
    let code = sqlx::query_as::<_, PromoCode>(&format!(
        r#"
        UPDATE promo_codes
        SET is_used = 1, used_at = datetime('now'), used_by = ?
        WHERE id = (
            SELECT id FROM promo_codes
            WHERE batch_id = ? AND is_used = 0
            ORDER BY {order_by}
            LIMIT 1
        )
        AND is_used = 0
        RETURNING {CODE_COLUMNS}
        "#
    ))
    .bind(used_by)
    .bind(batch_id)
    .fetch_optional(pool)
    .await?;

    Ok(code)
}

async fn claim_specific(
    pool: &SqlitePool,
    batch_id: &str,
    code: &str,
    used_by: Option<&str>,
) -> Result<Option<PromoCode>> {
    let code = code.trim().to_uppercase();

    let claimed = sqlx::query_as::<_, PromoCode>(&format!(
        r#"
        UPDATE promo_codes
        SET is_used = 1, used_at = datetime('now'), used_by = ?
        WHERE batch_id = ? AND code = ? AND is_used = 0
        RETURNING {CODE_COLUMNS}
        "#
    ))
    .bind(used_by)
    .bind(batch_id)
    .bind(&code)
    .fetch_optional(pool)
    .await?;

    if claimed.is_some() {
        return Ok(claimed);
    }

    let exists = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM promo_codes WHERE batch_id = ? AND code = ?",
    )
    .bind(batch_id)
    .bind(&code)
    .fetch_one(pool)
    .await?;

    if exists == 0 {
        return Err(DatabaseError::NotFound {
            entity: "PromoCode",
            id: code,
        });
    }

    Err(DatabaseError::AlreadyExists {
        entity: "PromoCodeRedemption",
        id: code,
    })
}

fn ensure_redeemable(batch: &PromoCodeBatch, now: DateTime<Utc>) -> Result<()> {
    let unavailable = |reason: &str| DatabaseError::BatchUnavailable {
        batch_id: batch.id.clone(),
        reason: reason.to_string(),
    };

    if !batch.is_active {
        return Err(unavailable("batch is inactive"));
    }

    let now = now.format(TIMESTAMP_FORMAT).to_string();
    if let Some(from) = &batch.valid_from {
        if now < *from {
            return Err(unavailable("batch is not valid yet"));
        }
    }
    if let Some(until) = &batch.valid_until {
        if now > *until {
            return Err(unavailable("batch has expired"));
        }
    }

    Ok(())
}

/// Normalize an RFC 3339, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD` timestamp to UTC storage format.
pub fn normalize_timestamp(value: &str) -> Result<String> {
    let value = value.trim();

    let parsed = DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc).naive_utc())
        .or_else(|_| NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT))
        .or_else(|_| NaiveDateTime::parse_from_str(&format!("{value} 00:00:00"), TIMESTAMP_FORMAT))
        .map_err(|_| invalid("timestamp", &format!("unrecognised timestamp '{value}'")))?;

    Ok(parsed.format(TIMESTAMP_FORMAT).to_string())
}

fn generate_codes(prefix: Option<&str>, length: usize, count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    let mut seen = HashSet::with_capacity(count);
    let mut codes = Vec::with_capacity(count);

    while codes.len() < count {
        let random: String = (0..length)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect();
        let code = match prefix {
            Some(prefix) => format!("{prefix}-{random}"),
            None => random,
        };
        if seen.insert(code.clone()) {
            codes.push(code);
        }
    }

    codes
}

fn invalid(field: &str, reason: &str) -> DatabaseError {
    DatabaseError::Invalid(ValidationError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_db;

    fn batch(count: u32) -> NewBatch {
        NewBatch {
            name: "Spring sale".to_string(),
            description: None,
            discount_type: "percentage".to_string(),
            discount_value: 15.0,
            prefix: Some("spring".to_string()),
            valid_from: None,
            valid_until: None,
            count,
            code_length: 6,
        }
    }

    fn owner() -> Owner {
        Owner::new("user-1", Some("org-1".to_string()))
    }

    #[tokio::test]
    async fn test_create_batch_generates_unique_codes() {
        let db = test_db().await;

        let created = create_batch(db.pool(), &owner(), &batch(50)).await.unwrap();
        assert_eq!(created.prefix.as_deref(), Some("SPRING"));

        let codes = list_codes(db.pool(), &created.id, false).await.unwrap();
        assert_eq!(codes.len(), 50);
        let unique: HashSet<_> = codes.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(unique.len(), 50);
        assert!(codes.iter().all(|c| c.code.starts_with("SPRING-") && c.code.len() == 13));
    }

    #[tokio::test]
    async fn test_create_batch_validation() {
        let db = test_db().await;

        let mut bad = batch(5);
        bad.discount_value = 150.0;
        assert!(matches!(
            create_batch(db.pool(), &owner(), &bad).await,
            Err(DatabaseError::Invalid(_))
        ));

        let mut bad = batch(0);
        bad.discount_type = "fixed".to_string();
        assert!(matches!(
            create_batch(db.pool(), &owner(), &bad).await,
            Err(DatabaseError::Invalid(_))
        ));

        let mut bad = batch(5);
        bad.valid_from = Some("2026-05-01".to_string());
        bad.valid_until = Some("2026-04-01T00:00:00Z".to_string());
        assert!(matches!(
            create_batch(db.pool(), &owner(), &bad).await,
            Err(DatabaseError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_used_code_is_never_claimed_again() {
        let db = test_db().await;
        let created = create_batch(db.pool(), &owner(), &batch(3)).await.unwrap();

        let mut claimed = HashSet::new();
        for _ in 0..3 {
            let c = claim_code(db.pool(), &created.id, &ClaimStrategy::Random, Some("u1"))
                .await
                .unwrap();
            assert!(c.code.is_used);
            assert_eq!(c.code.used_by.as_deref(), Some("u1"));
            assert_eq!(c.batch.discount_value, 15.0);
            assert!(claimed.insert(c.code.code));
        }

        let exhausted = claim_code(db.pool(), &created.id, &ClaimStrategy::Sequential, None).await;
        assert!(matches!(exhausted, Err(DatabaseError::Exhausted { .. })));
        assert_eq!(count_unused(db.pool(), &created.id).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_claims_never_share_a_code() {
        const CODES: u32 = 16;
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("claims.db").display());
        let db = crate::Database::connect_with_pool_size(&url, 8).await.unwrap();
        db.migrate().await.unwrap();
        let created = create_batch(db.pool(), &owner(), &batch(CODES)).await.unwrap();

        let claims: Vec<_> = (0..CODES)
            .map(|i| {
                let pool = db.pool().clone();
                let batch_id = created.id.clone();
                let strategy = if i % 2 == 0 { ClaimStrategy::Random } else { ClaimStrategy::Sequential };
                tokio::spawn(async move { claim_code(&pool, &batch_id, &strategy, Some("racer")).await })
            })
            .collect();

        let mut codes = HashSet::new();
        for claim in claims {
            let claimed = claim.await.unwrap().unwrap();
            assert!(codes.insert(claimed.code.code));
        }
        assert_eq!(codes.len(), CODES as usize);

        let exhausted = claim_code(db.pool(), &created.id, &ClaimStrategy::Random, None).await;
        assert!(matches!(exhausted, Err(DatabaseError::Exhausted { .. })));
        db.close().await;
    }

    #[tokio::test]
    async fn test_sequential_claims_in_creation_order() {
        let db = test_db().await;
        let created = create_batch(db.pool(), &owner(), &batch(3)).await.unwrap();
        let codes = list_codes(db.pool(), &created.id, true).await.unwrap();

        let first = claim_code(db.pool(), &created.id, &ClaimStrategy::Sequential, None)
            .await
            .unwrap();
        assert_eq!(first.code.code, codes[0].code);

        let second = claim_code(db.pool(), &created.id, &ClaimStrategy::Sequential, None)
            .await
            .unwrap();
        assert_eq!(second.code.code, codes[1].code);
    }

    #[tokio::test]
    async fn test_specific_and_redeem() {
        let db = test_db().await;
        let created = create_batch(db.pool(), &owner(), &batch(2)).await.unwrap();
        let codes = list_codes(db.pool(), &created.id, true).await.unwrap();

        let target = codes[1].code.clone();
        let claimed = claim_code(
            db.pool(),
            &created.id,
            &ClaimStrategy::Specific(target.to_lowercase()),
            None,
        )
        .await
        .unwrap();
        assert_eq!(claimed.code.code, target);

        let again = redeem_code(db.pool(), &target, Some("u2")).await;
        assert!(matches!(again, Err(DatabaseError::AlreadyExists { .. })));

        let unknown = redeem_code(db.pool(), "NOPE-123", None).await;
        assert!(matches!(unknown, Err(DatabaseError::NotFound { .. })));

        let other = redeem_code(db.pool(), &codes[0].code, Some("u2")).await.unwrap();
        assert_eq!(other.code.used_by.as_deref(), Some("u2"));
    }

    #[tokio::test]
    async fn test_expired_batch_cannot_be_claimed() {
        let db = test_db().await;
        let mut expired = batch(2);
        expired.valid_from = Some("2020-01-01".to_string());
        expired.valid_until = Some("2020-02-01T00:00:00Z".to_string());
        let created = create_batch(db.pool(), &owner(), &expired).await.unwrap();
        assert_eq!(created.valid_until.as_deref(), Some("2020-02-01 00:00:00"));

        let result = claim_code(db.pool(), &created.id, &ClaimStrategy::Random, None).await;
        assert!(matches!(result, Err(DatabaseError::BatchUnavailable { .. })));
    }

    #[test]
    fn test_normalize_timestamp() {
        assert_eq!(
            normalize_timestamp("2026-03-01T12:30:00+02:00").unwrap(),
            "2026-03-01 10:30:00"
        );
        assert_eq!(normalize_timestamp("2026-03-01").unwrap(), "2026-03-01 00:00:00");
        assert!(normalize_timestamp("yesterday").is_err());
    }
}
