//! Repository for the `api_keys` table.

use centinela_core::types::DbId;
use sqlx::PgPool;

use crate::models::api_key::ApiKey;

const API_KEY_COLUMNS: &str =
    "id, tenant_id, key_hash, key_prefix, name, is_active, last_used_at, created_at";

/// Provides CRUD operations for API keys.
pub struct ApiKeyRepo;

impl ApiKeyRepo {
    /// Create a new API key for a tenant. The caller generates the key and
    /// passes only the hash and display prefix.
    pub async fn create(
        pool: &PgPool,
        tenant_id: DbId,
        name: &str,
        key_hash: &str,
        key_prefix: &str,
    ) -> Result<ApiKey, sqlx::Error> {
        let query = format!(
            "INSERT INTO api_keys (tenant_id, name, key_hash, key_prefix) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {API_KEY_COLUMNS}"
        );
        sqlx::query_as::<_, ApiKey>(&query)
            .bind(tenant_id)
            .bind(name)
            .bind(key_hash)
            .bind(key_prefix)
            .fetch_one(pool)
            .await
    }

    /// Find an active API key by its SHA-256 hash.
    ///
    /// Used by the ingest auth gate. Inactive (revoked) keys are treated as
    /// missing.
    pub async fn find_active_by_hash(
        pool: &PgPool,
        key_hash: &str,
    ) -> Result<Option<ApiKey>, sqlx::Error> {
        let query = format!(
            "SELECT {API_KEY_COLUMNS} FROM api_keys \
             WHERE key_hash = $1 AND is_active = TRUE"
        );
        sqlx::query_as::<_, ApiKey>(&query)
            .bind(key_hash)
            .fetch_optional(pool)
            .await
    }

    /// Update `last_used_at` to the current timestamp.
    pub async fn touch_last_used(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE api_keys SET last_used_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Revoke an API key.
    pub async fn revoke(pool: &PgPool, id: DbId) -> Result<Option<ApiKey>, sqlx::Error> {
        let query = format!(
            "UPDATE api_keys SET is_active = FALSE \
             WHERE id = $1 AND is_active = TRUE \
             RETURNING {API_KEY_COLUMNS}"
        );
        sqlx::query_as::<_, ApiKey>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
