//! Repository for persisted AI agent outputs.

use centinela_core::types::DbId;
use sqlx::PgPool;

use crate::models::ai::{AiAnalysis, AiRecommendation, AiReport, NewAiAnalysis};

const ANALYSIS_COLUMNS: &str = "\
    id, detection_id, tenant_id, threat_detected, threat_type, confidence_score, \
    severity, context_summary, iocs, model_used, tokens_used, latency_ms, \
    from_cache, created_at";

const RECOMMENDATION_COLUMNS: &str = "\
    id, detection_id, tenant_id, urgency, actions, model_used, tokens_used, \
    latency_ms, created_at";

const REPORT_COLUMNS: &str = "\
    id, detection_id, tenant_id, subject, body, judge_result, judge_reason, \
    status, sent_at, model_used, tokens_used, latency_ms, created_at";

/// Provides insert/query operations for AI analyses, recommendations, and
/// reports.
pub struct AiRepo;

impl AiRepo {
    /// Insert an analysis row.
    pub async fn insert_analysis(
        pool: &PgPool,
        a: &NewAiAnalysis,
    ) -> Result<AiAnalysis, sqlx::Error> {
        let query = format!(
            "INSERT INTO ai_analyses \
                (detection_id, tenant_id, threat_detected, threat_type, \
                 confidence_score, severity, context_summary, iocs, model_used, \
                 tokens_used, latency_ms, from_cache) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {ANALYSIS_COLUMNS}"
        );
        sqlx::query_as::<_, AiAnalysis>(&query)
            .bind(a.detection_id)
            .bind(a.tenant_id)
            .bind(a.threat_detected)
            .bind(a.threat_type.as_deref())
            .bind(a.confidence_score)
            .bind(a.severity.as_deref())
            .bind(a.context_summary.as_deref())
            .bind(&a.iocs)
            .bind(a.model_used.as_deref())
            .bind(a.tokens_used)
            .bind(a.latency_ms)
            .bind(a.from_cache)
            .fetch_one(pool)
            .await
    }

    /// Whether a detection already has an analysis (cached or live).
    pub async fn has_analysis(pool: &PgPool, detection_id: DbId) -> Result<bool, sqlx::Error> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM ai_analyses WHERE detection_id = $1")
                .bind(detection_id)
                .fetch_one(pool)
                .await?;
        Ok(count > 0)
    }

    /// Insert a recommendation row.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_recommendation(
        pool: &PgPool,
        detection_id: DbId,
        tenant_id: DbId,
        urgency: Option<&str>,
        actions: &serde_json::Value,
        model_used: Option<&str>,
        tokens_used: Option<i32>,
        latency_ms: Option<i32>,
    ) -> Result<AiRecommendation, sqlx::Error> {
        let query = format!(
            "INSERT INTO ai_recommendations \
                (detection_id, tenant_id, urgency, actions, model_used, \
                 tokens_used, latency_ms) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {RECOMMENDATION_COLUMNS}"
        );
        sqlx::query_as::<_, AiRecommendation>(&query)
            .bind(detection_id)
            .bind(tenant_id)
            .bind(urgency)
            .bind(actions)
            .bind(model_used)
            .bind(tokens_used)
            .bind(latency_ms)
            .fetch_one(pool)
            .await
    }

    /// Insert a generated report row.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_report(
        pool: &PgPool,
        detection_id: DbId,
        tenant_id: DbId,
        subject: &str,
        body: &str,
        judge_result: Option<&str>,
        judge_reason: Option<&str>,
        model_used: Option<&str>,
        tokens_used: Option<i32>,
        latency_ms: Option<i32>,
    ) -> Result<AiReport, sqlx::Error> {
        let query = format!(
            "INSERT INTO ai_reports \
                (detection_id, tenant_id, subject, body, judge_result, \
                 judge_reason, status, model_used, tokens_used, latency_ms) \
             VALUES ($1, $2, $3, $4, $5, $6, 'generated', $7, $8, $9) \
             RETURNING {REPORT_COLUMNS}"
        );
        sqlx::query_as::<_, AiReport>(&query)
            .bind(detection_id)
            .bind(tenant_id)
            .bind(subject)
            .bind(body)
            .bind(judge_result)
            .bind(judge_reason)
            .bind(model_used)
            .bind(tokens_used)
            .bind(latency_ms)
            .fetch_one(pool)
            .await
    }

    /// Find the analysis for a detection, if any.
    pub async fn find_analysis(
        pool: &PgPool,
        detection_id: DbId,
    ) -> Result<Option<AiAnalysis>, sqlx::Error> {
        let query = format!(
            "SELECT {ANALYSIS_COLUMNS} FROM ai_analyses \
             WHERE detection_id = $1 ORDER BY created_at DESC LIMIT 1"
        );
        sqlx::query_as::<_, AiAnalysis>(&query)
            .bind(detection_id)
            .fetch_optional(pool)
            .await
    }

    /// Find the report for a detection, if any.
    pub async fn find_report(
        pool: &PgPool,
        detection_id: DbId,
    ) -> Result<Option<AiReport>, sqlx::Error> {
        let query = format!(
            "SELECT {REPORT_COLUMNS} FROM ai_reports \
             WHERE detection_id = $1 ORDER BY created_at DESC LIMIT 1"
        );
        sqlx::query_as::<_, AiReport>(&query)
            .bind(detection_id)
            .fetch_optional(pool)
            .await
    }
}
