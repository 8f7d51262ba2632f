//! Repository for the `ai_cache_entries` table.

use centinela_core::types::DbId;
use sqlx::PgPool;

use crate::models::ai_cache::{AiCacheEntry, NewAiCacheEntry};

const CACHE_COLUMNS: &str = "\
    id, tenant_id, pattern_signature, detection_type, severity, threat_detected, \
    threat_type, confidence_score, context_summary, recommended_actions, \
    report_subject, report_body, hit_count, last_hit_at, expires_at, is_valid, \
    created_at, updated_at";

/// Provides lookup/upsert/invalidation operations for the AI knowledge
/// cache.
pub struct AiCacheRepo;

impl AiCacheRepo {
    /// Look up a live cache entry and record the hit.
    ///
    /// Only valid, unexpired entries are returned; the hit counter and
    /// `last_hit_at` are bumped in the same statement so the read and the
    /// bookkeeping cannot diverge.
    pub async fn lookup_valid(
        pool: &PgPool,
        tenant_id: DbId,
        pattern_signature: &str,
    ) -> Result<Option<AiCacheEntry>, sqlx::Error> {
        let query = format!(
            "UPDATE ai_cache_entries \
             SET hit_count = hit_count + 1, last_hit_at = NOW() \
             WHERE tenant_id = $1 AND pattern_signature = $2 \
               AND is_valid = TRUE AND expires_at > NOW() \
             RETURNING {CACHE_COLUMNS}"
        );
        sqlx::query_as::<_, AiCacheEntry>(&query)
            .bind(tenant_id)
            .bind(pattern_signature)
            .fetch_optional(pool)
            .await
    }

    /// Insert or overwrite the entry for `(tenant, signature)`.
    ///
    /// A conflict replaces the content fields, revalidates the row, and
    /// restarts the TTL clock.
    pub async fn upsert(
        pool: &PgPool,
        entry: &NewAiCacheEntry,
        ttl_days: i64,
    ) -> Result<AiCacheEntry, sqlx::Error> {
        let query = format!(
            "INSERT INTO ai_cache_entries \
                (tenant_id, pattern_signature, detection_type, severity, \
                 threat_detected, threat_type, confidence_score, context_summary, \
                 recommended_actions, report_subject, report_body, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, \
                     NOW() + make_interval(days => $12::int)) \
             ON CONFLICT (tenant_id, pattern_signature) DO UPDATE SET \
                 detection_type = EXCLUDED.detection_type, \
                 severity = EXCLUDED.severity, \
                 threat_detected = EXCLUDED.threat_detected, \
                 threat_type = EXCLUDED.threat_type, \
                 confidence_score = EXCLUDED.confidence_score, \
                 context_summary = EXCLUDED.context_summary, \
                 recommended_actions = EXCLUDED.recommended_actions, \
                 report_subject = EXCLUDED.report_subject, \
                 report_body = EXCLUDED.report_body, \
                 expires_at = EXCLUDED.expires_at, \
                 is_valid = TRUE, \
                 updated_at = NOW() \
             RETURNING {CACHE_COLUMNS}"
        );
        sqlx::query_as::<_, AiCacheEntry>(&query)
            .bind(entry.tenant_id)
            .bind(&entry.pattern_signature)
            .bind(&entry.detection_type)
            .bind(&entry.severity)
            .bind(entry.threat_detected)
            .bind(entry.threat_type.as_deref())
            .bind(entry.confidence_score)
            .bind(entry.context_summary.as_deref())
            .bind(&entry.recommended_actions)
            .bind(entry.report_subject.as_deref())
            .bind(entry.report_body.as_deref())
            .bind(ttl_days)
            .fetch_one(pool)
            .await
    }

    /// Invalidate the entry for one pattern signature.
    pub async fn invalidate_by_pattern(
        pool: &PgPool,
        tenant_id: DbId,
        pattern_signature: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE ai_cache_entries SET is_valid = FALSE, updated_at = NOW() \
             WHERE tenant_id = $1 AND pattern_signature = $2",
        )
        .bind(tenant_id)
        .bind(pattern_signature)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Invalidate every entry for a detection type. Must be called after
    /// any change to the corresponding rule's semantics.
    pub async fn invalidate_by_type(
        pool: &PgPool,
        tenant_id: DbId,
        detection_type: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE ai_cache_entries SET is_valid = FALSE, updated_at = NOW() \
             WHERE tenant_id = $1 AND detection_type = $2",
        )
        .bind(tenant_id)
        .bind(detection_type)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete expired and invalidated rows. Intended for a daily sweep.
    pub async fn cleanup(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM ai_cache_entries WHERE expires_at < NOW() OR is_valid = FALSE")
                .execute(pool)
                .await?;
        Ok(result.rows_affected())
    }
}
