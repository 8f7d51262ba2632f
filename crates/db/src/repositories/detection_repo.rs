//! Repository for the `detections` table.
//!
//! The open-detection invariant lives here: `uq_detections_open` (partial
//! unique index over rows where `reported_digest_id IS NULL`) backs the
//! update-or-insert flow in the rules engine.

use centinela_core::types::{DbId, Timestamp};
use sqlx::{PgConnection, PgPool};

use crate::models::detection::{Detection, NewDetection};

const DETECTION_COLUMNS: &str = "\
    id, tenant_id, site_id, source_id, detection_type, severity, group_key, \
    window_minutes, event_count, first_event_at, last_event_at, evidence, \
    related_event_ids, reported_digest_id, acknowledged, created_at";

/// Sorts severities in SQL, most severe first.
const SEVERITY_RANK: &str = "\
    CASE severity \
        WHEN 'critical' THEN 5 WHEN 'high' THEN 4 WHEN 'medium' THEN 3 \
        WHEN 'low' THEN 2 ELSE 1 END";

/// Provides operations on detections.
pub struct DetectionRepo;

impl DetectionRepo {
    /// Find the open detection for `(tenant, detection_type, group_key)`,
    /// if any.
    pub async fn find_open(
        pool: &PgPool,
        tenant_id: DbId,
        detection_type: &str,
        group_key: &str,
    ) -> Result<Option<Detection>, sqlx::Error> {
        let query = format!(
            "SELECT {DETECTION_COLUMNS} FROM detections \
             WHERE tenant_id = $1 AND detection_type = $2 AND group_key = $3 \
               AND reported_digest_id IS NULL"
        );
        sqlx::query_as::<_, Detection>(&query)
            .bind(tenant_id)
            .bind(detection_type)
            .bind(group_key)
            .fetch_optional(pool)
            .await
    }

    /// Insert a new detection.
    pub async fn insert(pool: &PgPool, d: &NewDetection) -> Result<Detection, sqlx::Error> {
        let query = format!(
            "INSERT INTO detections \
                (tenant_id, site_id, source_id, detection_type, severity, group_key, \
                 window_minutes, event_count, first_event_at, last_event_at, \
                 evidence, related_event_ids) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {DETECTION_COLUMNS}"
        );
        sqlx::query_as::<_, Detection>(&query)
            .bind(d.tenant_id)
            .bind(d.site_id.as_deref())
            .bind(d.source_id.as_deref())
            .bind(&d.detection_type)
            .bind(&d.severity)
            .bind(&d.group_key)
            .bind(d.window_minutes)
            .bind(d.event_count)
            .bind(d.first_event_at)
            .bind(d.last_event_at)
            .bind(&d.evidence)
            .bind(&d.related_event_ids)
            .fetch_one(pool)
            .await
    }

    /// Refresh an open detection with the latest aggregation results.
    ///
    /// Only open rows are touched; a detection that was reported between
    /// the scan and this call is left frozen and the method returns `None`.
    pub async fn update_open(
        pool: &PgPool,
        id: DbId,
        severity: &str,
        event_count: i64,
        first_event_at: Timestamp,
        last_event_at: Timestamp,
        evidence: &serde_json::Value,
        related_event_ids: &[DbId],
    ) -> Result<Option<Detection>, sqlx::Error> {
        let query = format!(
            "UPDATE detections SET \
                 severity = $2, event_count = $3, \
                 first_event_at = LEAST(first_event_at, $4), \
                 last_event_at = GREATEST(last_event_at, $5), \
                 evidence = $6, related_event_ids = $7 \
             WHERE id = $1 AND reported_digest_id IS NULL \
             RETURNING {DETECTION_COLUMNS}"
        );
        sqlx::query_as::<_, Detection>(&query)
            .bind(id)
            .bind(severity)
            .bind(event_count)
            .bind(first_event_at)
            .bind(last_event_at)
            .bind(evidence)
            .bind(related_event_ids)
            .fetch_optional(pool)
            .await
    }

    /// Tenants that currently have at least one open detection.
    pub async fn tenants_with_open(pool: &PgPool) -> Result<Vec<DbId>, sqlx::Error> {
        let rows: Vec<(DbId,)> = sqlx::query_as(
            "SELECT DISTINCT tenant_id FROM detections WHERE reported_digest_id IS NULL",
        )
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// All open detections for a tenant, most severe first, then most
    /// recently active.
    pub async fn list_open_for_tenant(
        pool: &PgPool,
        tenant_id: DbId,
    ) -> Result<Vec<Detection>, sqlx::Error> {
        let query = format!(
            "SELECT {DETECTION_COLUMNS} FROM detections \
             WHERE tenant_id = $1 AND reported_digest_id IS NULL \
             ORDER BY {SEVERITY_RANK} DESC, last_event_at DESC"
        );
        sqlx::query_as::<_, Detection>(&query)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
    }

    /// Stamp a set of detections as reported by a digest. Runs inside the
    /// batcher's transaction so the digest insert and the stamps commit
    /// together.
    pub async fn mark_reported(
        conn: &mut PgConnection,
        ids: &[DbId],
        digest_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE detections SET reported_digest_id = $2 \
             WHERE id = ANY($1) AND reported_digest_id IS NULL",
        )
        .bind(ids)
        .bind(digest_id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// High/critical detections with no AI analysis yet, oldest first.
    pub async fn list_pending_ai(
        pool: &PgPool,
        limit: i64,
    ) -> Result<Vec<Detection>, sqlx::Error> {
        let query = format!(
            "SELECT {DETECTION_COLUMNS} FROM (
                 SELECT d.* FROM detections d \
                 LEFT JOIN ai_analyses a ON a.detection_id = d.id \
                 WHERE d.severity IN ('high', 'critical') AND a.id IS NULL \
                 ORDER BY d.created_at ASC \
                 LIMIT $1
             ) AS detections"
        );
        sqlx::query_as::<_, Detection>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Find a detection by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Detection>, sqlx::Error> {
        let query = format!("SELECT {DETECTION_COLUMNS} FROM detections WHERE id = $1");
        sqlx::query_as::<_, Detection>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
