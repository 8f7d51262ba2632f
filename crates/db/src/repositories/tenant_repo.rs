//! Repository for the `tenants` table.

use centinela_core::types::DbId;
use sqlx::PgPool;

use crate::models::tenant::Tenant;

const TENANT_COLUMNS: &str =
    "id, name, status, plan_tier, default_locale, timezone, created_at";

/// Provides CRUD operations for tenants.
pub struct TenantRepo;

impl TenantRepo {
    /// Create a tenant. Used by operator provisioning and tests.
    pub async fn create(
        pool: &PgPool,
        name: &str,
        plan_tier: &str,
        default_locale: &str,
        timezone: &str,
    ) -> Result<Tenant, sqlx::Error> {
        let query = format!(
            "INSERT INTO tenants (name, plan_tier, default_locale, timezone) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {TENANT_COLUMNS}"
        );
        sqlx::query_as::<_, Tenant>(&query)
            .bind(name)
            .bind(plan_tier)
            .bind(default_locale)
            .bind(timezone)
            .fetch_one(pool)
            .await
    }

    /// Find a tenant by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Tenant>, sqlx::Error> {
        let query = format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE id = $1");
        sqlx::query_as::<_, Tenant>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
