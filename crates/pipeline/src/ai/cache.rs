//! The AI knowledge cache.
//!
//! Keyed by `(tenant_id, pattern_signature)`, where the signature hashes
//! the detection type, severity, and *bucketized* evidence counts. The
//! bucketing is what lets similar-but-not-identical incidents share one
//! cached orchestrator response and bound LLM spend.

use std::collections::BTreeMap;

use centinela_core::severity::Severity;
use centinela_core::signature::pattern_signature;
use centinela_core::types::DbId;
use centinela_db::models::ai_cache::{AiCacheEntry, NewAiCacheEntry};
use centinela_db::models::detection::Detection;
use centinela_db::repositories::AiCacheRepo;
use centinela_db::DbPool;

/// Default entry lifetime in days (`AI_CACHE_TTL_DAYS`).
pub const DEFAULT_TTL_DAYS: i64 = 30;

/// Tenant-scoped cache over the `ai_cache_entries` table.
pub struct KnowledgeCache {
    pool: DbPool,
    ttl_days: i64,
}

impl KnowledgeCache {
    pub fn new(pool: DbPool, ttl_days: i64) -> Self {
        Self { pool, ttl_days }
    }

    /// TTL from `AI_CACHE_TTL_DAYS`, defaulting to 30 days.
    pub fn ttl_from_env() -> i64 {
        std::env::var("AI_CACHE_TTL_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TTL_DAYS)
    }

    /// Compute the pattern signature for a detection.
    ///
    /// The numeric evidence fields (`event_count`, `unique_src_ips`,
    /// `unique_src_users`) are bucketized before hashing. Rule version is
    /// deliberately not part of the signature: after changing a rule's
    /// semantics, call [`invalidate_by_type`](Self::invalidate_by_type).
    pub fn signature_for(detection: &Detection) -> String {
        let severity = detection
            .severity
            .parse::<Severity>()
            .unwrap_or(Severity::Info);

        let mut counts = BTreeMap::new();
        counts.insert("event_count".to_string(), detection.event_count);
        for field in ["unique_src_ips", "unique_src_users"] {
            if let Some(n) = detection.evidence.get(field).and_then(|v| v.as_i64()) {
                counts.insert(field.to_string(), n);
            }
        }

        pattern_signature(&detection.detection_type, severity, &counts)
    }

    /// Look up a live entry, bumping its hit statistics.
    pub async fn lookup(
        &self,
        tenant_id: DbId,
        signature: &str,
    ) -> Result<Option<AiCacheEntry>, sqlx::Error> {
        let entry = AiCacheRepo::lookup_valid(&self.pool, tenant_id, signature).await?;
        if let Some(entry) = &entry {
            tracing::debug!(
                tenant_id,
                signature,
                hit_count = entry.hit_count,
                "AI cache hit"
            );
        }
        Ok(entry)
    }

    /// Store (or refresh) the composed orchestrator result.
    pub async fn store(&self, entry: &NewAiCacheEntry) -> Result<AiCacheEntry, sqlx::Error> {
        AiCacheRepo::upsert(&self.pool, entry, self.ttl_days).await
    }

    /// Invalidate one pattern for a tenant.
    pub async fn invalidate_by_pattern(
        &self,
        tenant_id: DbId,
        signature: &str,
    ) -> Result<u64, sqlx::Error> {
        AiCacheRepo::invalidate_by_pattern(&self.pool, tenant_id, signature).await
    }

    /// Invalidate every cached response for a detection type. Required
    /// after any rule-semantics change.
    pub async fn invalidate_by_type(
        &self,
        tenant_id: DbId,
        detection_type: &str,
    ) -> Result<u64, sqlx::Error> {
        let n = AiCacheRepo::invalidate_by_type(&self.pool, tenant_id, detection_type).await?;
        tracing::info!(tenant_id, detection_type, invalidated = n, "AI cache invalidated by type");
        Ok(n)
    }

    /// Drop expired and invalidated rows. Scheduled daily.
    pub async fn cleanup(&self) -> Result<u64, sqlx::Error> {
        let removed = AiCacheRepo::cleanup(&self.pool).await?;
        if removed > 0 {
            tracing::info!(removed, "AI cache cleanup removed stale entries");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn detection(event_count: i64, unique_ips: i64) -> Detection {
        Detection {
            id: 1,
            tenant_id: 1,
            site_id: None,
            source_id: None,
            detection_type: "vpn_bruteforce".to_string(),
            severity: "high".to_string(),
            group_key: "192.168.100.50".to_string(),
            window_minutes: 15,
            event_count,
            first_event_at: Utc::now(),
            last_event_at: Utc::now(),
            evidence: serde_json::json!({
                "event_count": event_count,
                "unique_src_ips": unique_ips,
                "unique_src_users": 2,
            }),
            related_event_ids: vec![],
            reported_digest_id: None,
            acknowledged: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn detections_in_the_same_buckets_share_a_signature() {
        // 6 and 9 events both land in the 6-10 bucket.
        assert_eq!(
            KnowledgeCache::signature_for(&detection(6, 1)),
            KnowledgeCache::signature_for(&detection(9, 1))
        );
    }

    #[test]
    fn different_buckets_produce_different_signatures() {
        assert_ne!(
            KnowledgeCache::signature_for(&detection(6, 1)),
            KnowledgeCache::signature_for(&detection(60, 1))
        );
    }
}
