//! Integration credential CRUD operations.
//!
//! The `config` column is opaque ciphertext here; encryption lives in the
//! credential vault.

use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::{IntegrationCredential, Owner};
use crate::validation::{validate_name, validate_one_of};

/// Provider slugs accepted for credentials.
pub const PROVIDERS: &[&str] = &["slack", "whatsapp", "sms"];

const CREDENTIAL_COLUMNS: &str =
    "id, user_id, organization_id, provider, name, config, is_active, created_at, updated_at";

/// Store a new credential with already-encrypted config.
pub async fn create_credential(
    pool: &SqlitePool,
    owner: &Owner,
    provider: &str,
    name: &str,
    encrypted_config: &str,
) -> Result<IntegrationCredential> {
    validate_name("name", name)?;
    validate_one_of("provider", provider, PROVIDERS)?;
    let id = crate::new_id();

    sqlx::query(
        r#"
        INSERT INTO integration_credentials (id, user_id, organization_id, provider, name, config)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&owner.user_id)
    .bind(&owner.organization_id)
    .bind(provider)
    .bind(name.trim())
    .bind(encrypted_config)
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::from_insert(e, "IntegrationCredential", name))?;

    get_credential(pool, &id).await
}

/// Get a credential by ID.
pub async fn get_credential(pool: &SqlitePool, id: &str) -> Result<IntegrationCredential> {
    sqlx::query_as::<_, IntegrationCredential>(&format!(
        "SELECT {CREDENTIAL_COLUMNS} FROM integration_credentials WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "IntegrationCredential",
        id: id.to_string(),
    })
}

/// List credentials visible to an owner, optionally for one provider.
pub async fn list_credentials(
    pool: &SqlitePool,
    owner: &Owner,
    provider: Option<&str>,
) -> Result<Vec<IntegrationCredential>> {
    let credentials = sqlx::query_as::<_, IntegrationCredential>(&format!(
        r#"
        SELECT {CREDENTIAL_COLUMNS}
        FROM integration_credentials
        WHERE (user_id = ? OR (organization_id IS NOT NULL AND organization_id = ?))
          AND (? IS NULL OR provider = ?)
        ORDER BY provider, name
        "#
    ))
    .bind(&owner.user_id)
    .bind(&owner.organization_id)
    .bind(provider)
    .bind(provider)
    .fetch_all(pool)
    .await?;

    Ok(credentials)
}

/// Update a credential. `None` leaves a field unchanged.
pub async fn update_credential(
    pool: &SqlitePool,
    id: &str,
    name: Option<&str>,
    encrypted_config: Option<&str>,
    is_active: Option<bool>,
) -> Result<IntegrationCredential> {
    if let Some(name) = name {
        validate_name("name", name)?;
    }

    let result = sqlx::query(
        r#"
        UPDATE integration_credentials
        SET name = COALESCE(?, name),
            config = COALESCE(?, config),
            is_active = COALESCE(?, is_active),
            updated_at = datetime('now')
        WHERE id = ?
        "#,
    )
    .bind(name.map(str::trim))
    .bind(encrypted_config)
    .bind(is_active)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::from_insert(e, "IntegrationCredential", name.unwrap_or(id)))?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "IntegrationCredential",
            id: id.to_string(),
        });
    }

    get_credential(pool, id).await
}

/// Delete a credential.
pub async fn delete_credential(pool: &SqlitePool, id: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        DELETE FROM integration_credentials
        WHERE id = ?
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "IntegrationCredential",
            id: id.to_string(),
        });
    }

    Ok(())
}

/// Find the most recently updated active credential of an organization for a provider.
pub async fn find_active(
    pool: &SqlitePool,
    organization_id: &str,
    provider: &str,
) -> Result<Option<IntegrationCredential>> {
    let credential = sqlx::query_as::<_, IntegrationCredential>(&format!(
        r#"
        SELECT {CREDENTIAL_COLUMNS}
        FROM integration_credentials
        WHERE organization_id = ? AND provider = ? AND is_active = 1
        ORDER BY updated_at DESC, rowid DESC
        LIMIT 1
        "#
    ))
    .bind(organization_id)
    .bind(provider)
    .fetch_optional(pool)
    .await?;

    Ok(credential)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_db;

    #[tokio::test]
    async fn test_credential_crud() {
        let db = test_db().await;
        let owner = Owner::new("user-1", Some("org-1".to_string()));

        let created = create_credential(db.pool(), &owner, "whatsapp", "Freshchat", "cipher-1")
            .await
            .unwrap();
        assert!(created.is_active);

        let dup = create_credential(db.pool(), &owner, "whatsapp", "Freshchat", "cipher-2").await;
        assert!(matches!(dup, Err(DatabaseError::AlreadyExists { .. })));

        let bad = create_credential(db.pool(), &owner, "fax", "Fax", "c").await;
        assert!(matches!(bad, Err(DatabaseError::Invalid(_))));

        let updated = update_credential(db.pool(), &created.id, None, Some("cipher-3"), Some(false))
            .await
            .unwrap();
        assert_eq!(updated.name, "Freshchat");
        assert_eq!(updated.config, "cipher-3");
        assert!(!updated.is_active);

        let listed = list_credentials(db.pool(), &owner, Some("whatsapp")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(list_credentials(db.pool(), &owner, Some("slack")).await.unwrap().is_empty());

        delete_credential(db.pool(), &created.id).await.unwrap();
        assert!(matches!(
            get_credential(db.pool(), &created.id).await,
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_find_active_skips_inactive() {
        let db = test_db().await;
        let owner = Owner::new("user-1", Some("org-1".to_string()));

        let sms = create_credential(db.pool(), &owner, "sms", "Twilio", "c").await.unwrap();
        assert_eq!(
            find_active(db.pool(), "org-1", "sms").await.unwrap().map(|c| c.id),
            Some(sms.id.clone())
        );

        update_credential(db.pool(), &sms.id, None, None, Some(false)).await.unwrap();
        assert!(find_active(db.pool(), "org-1", "sms").await.unwrap().is_none());
        assert!(find_active(db.pool(), "org-2", "sms").await.unwrap().is_none());
    }

    #[test]
    fn test_config_is_not_serialized() {
        let credential = IntegrationCredential {
            id: "c1".to_string(),
            user_id: "u".to_string(),
            organization_id: None,
            provider: "slack".to_string(),
            name: "Slack".to_string(),
            config: "secret".to_string(),
            is_active: true,
            created_at: String::new(),
            updated_at: String::new(),
        };
        let json = serde_json::to_string(&credential).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"provider\":\"slack\""));
    }
}
