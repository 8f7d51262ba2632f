//! Repository for the `raw_events` table.

use centinela_core::types::DbId;
use sqlx::{PgConnection, PgPool};

use crate::models::raw_event::{NewRawEvent, RawEvent};

const RAW_EVENT_COLUMNS: &str = "\
    id, tenant_id, site_id, source_id, received_at, source_ip, transport, \
    raw_message, collector_name, payload_sha256, parsed, parse_error, created_at";

/// Provides operations on raw (as-received) syslog events.
pub struct RawEventRepo;

impl RawEventRepo {
    /// Insert a raw event from the ingest queue.
    pub async fn insert(pool: &PgPool, event: &NewRawEvent) -> Result<RawEvent, sqlx::Error> {
        let query = format!(
            "INSERT INTO raw_events \
                (tenant_id, site_id, source_id, received_at, source_ip, \
                 transport, raw_message, collector_name, payload_sha256) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {RAW_EVENT_COLUMNS}"
        );
        sqlx::query_as::<_, RawEvent>(&query)
            .bind(event.tenant_id)
            .bind(event.site_id.as_deref())
            .bind(event.source_id.as_deref())
            .bind(event.received_at)
            .bind(event.source_ip.as_deref())
            .bind(&event.transport)
            .bind(&event.raw_message)
            .bind(event.collector_name.as_deref())
            .bind(event.payload_sha256.as_deref())
            .fetch_one(pool)
            .await
    }

    /// List up to `limit` unparsed events, oldest first.
    pub async fn list_unparsed(pool: &PgPool, limit: i64) -> Result<Vec<RawEvent>, sqlx::Error> {
        let query = format!(
            "SELECT {RAW_EVENT_COLUMNS} FROM raw_events \
             WHERE parsed = FALSE \
             ORDER BY received_at ASC, id ASC \
             LIMIT $1"
        );
        sqlx::query_as::<_, RawEvent>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Mark a raw event as parsed. Runs inside the normalizer's transaction
    /// so the flag and the normalized row commit together.
    pub async fn mark_parsed(conn: &mut PgConnection, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE raw_events SET parsed = TRUE, parse_error = NULL WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Mark a raw event as parsed-with-error so it is never reprocessed.
    pub async fn mark_parse_error(
        pool: &PgPool,
        id: DbId,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE raw_events SET parsed = TRUE, parse_error = $2 WHERE id = $1")
            .bind(id)
            .bind(error)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Find raw events by ID, preserving no particular order.
    pub async fn find_by_ids(pool: &PgPool, ids: &[DbId]) -> Result<Vec<RawEvent>, sqlx::Error> {
        let query = format!("SELECT {RAW_EVENT_COLUMNS} FROM raw_events WHERE id = ANY($1)");
        sqlx::query_as::<_, RawEvent>(&query)
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    /// Delete raw events received more than `days` days ago. Returns the
    /// number of rows removed.
    pub async fn delete_older_than(pool: &PgPool, days: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM raw_events \
             WHERE received_at < NOW() - make_interval(days => $1::int)",
        )
        .bind(days)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
