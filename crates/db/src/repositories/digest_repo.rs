//! Repository for the `digests` and `email_deliveries` tables.

use centinela_core::types::DbId;
use sqlx::{PgConnection, PgPool};

use crate::models::digest::{Digest, EmailDelivery, NewDigest};

const DIGEST_COLUMNS: &str = "\
    id, tenant_id, window_start, window_end, severity, detection_count, \
    event_count, subject, body_text, body_html, locale, created_at";

const DELIVERY_COLUMNS: &str = "\
    id, digest_id, tenant_id, recipient, provider_message_id, status, error, \
    sent_at, created_at";

/// Provides operations on digests and their delivery records.
pub struct DigestRepo;

impl DigestRepo {
    /// Insert a digest inside the batcher's transaction.
    pub async fn insert(conn: &mut PgConnection, d: &NewDigest) -> Result<Digest, sqlx::Error> {
        let query = format!(
            "INSERT INTO digests \
                (tenant_id, window_start, window_end, severity, detection_count, \
                 event_count, subject, body_text, body_html, locale) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {DIGEST_COLUMNS}"
        );
        sqlx::query_as::<_, Digest>(&query)
            .bind(d.tenant_id)
            .bind(d.window_start)
            .bind(d.window_end)
            .bind(&d.severity)
            .bind(d.detection_count)
            .bind(d.event_count)
            .bind(&d.subject)
            .bind(&d.body_text)
            .bind(d.body_html.as_deref())
            .bind(&d.locale)
            .fetch_one(conn)
            .await
    }

    /// Digests with no successful delivery yet, oldest first.
    pub async fn list_unsent(pool: &PgPool) -> Result<Vec<Digest>, sqlx::Error> {
        let query = format!(
            "SELECT {DIGEST_COLUMNS} FROM digests d \
             WHERE NOT EXISTS (\
                 SELECT 1 FROM email_deliveries e \
                 WHERE e.digest_id = d.id AND e.status = 'sent') \
             ORDER BY d.created_at ASC"
        );
        sqlx::query_as::<_, Digest>(&query).fetch_all(pool).await
    }

    /// Find a digest by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Digest>, sqlx::Error> {
        let query = format!("SELECT {DIGEST_COLUMNS} FROM digests WHERE id = $1");
        sqlx::query_as::<_, Digest>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Email deliveries
    // -----------------------------------------------------------------------

    /// Whether the digest already has a successful delivery.
    pub async fn has_sent_delivery(pool: &PgPool, digest_id: DbId) -> Result<bool, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM email_deliveries WHERE digest_id = $1 AND status = 'sent'",
        )
        .bind(digest_id)
        .fetch_one(pool)
        .await?;
        Ok(count > 0)
    }

    /// Record a successful delivery.
    pub async fn record_sent(
        pool: &PgPool,
        digest_id: DbId,
        tenant_id: DbId,
        recipient: &str,
        provider_message_id: Option<&str>,
    ) -> Result<EmailDelivery, sqlx::Error> {
        let query = format!(
            "INSERT INTO email_deliveries \
                (digest_id, tenant_id, recipient, provider_message_id, status, sent_at) \
             VALUES ($1, $2, $3, $4, 'sent', NOW()) \
             RETURNING {DELIVERY_COLUMNS}"
        );
        sqlx::query_as::<_, EmailDelivery>(&query)
            .bind(digest_id)
            .bind(tenant_id)
            .bind(recipient)
            .bind(provider_message_id)
            .fetch_one(pool)
            .await
    }

    /// Record a failed delivery attempt; the next dispatch pass retries.
    pub async fn record_failed(
        pool: &PgPool,
        digest_id: DbId,
        tenant_id: DbId,
        recipient: &str,
        error: &str,
    ) -> Result<EmailDelivery, sqlx::Error> {
        let query = format!(
            "INSERT INTO email_deliveries \
                (digest_id, tenant_id, recipient, status, error) \
             VALUES ($1, $2, $3, 'failed', $4) \
             RETURNING {DELIVERY_COLUMNS}"
        );
        sqlx::query_as::<_, EmailDelivery>(&query)
            .bind(digest_id)
            .bind(tenant_id)
            .bind(recipient)
            .bind(error)
            .fetch_one(pool)
            .await
    }

    /// List delivery attempts for a digest, newest first.
    pub async fn list_deliveries(
        pool: &PgPool,
        digest_id: DbId,
    ) -> Result<Vec<EmailDelivery>, sqlx::Error> {
        let query = format!(
            "SELECT {DELIVERY_COLUMNS} FROM email_deliveries \
             WHERE digest_id = $1 ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, EmailDelivery>(&query)
            .bind(digest_id)
            .fetch_all(pool)
            .await
    }
}
