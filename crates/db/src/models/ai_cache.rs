//! AI knowledge cache model.

use centinela_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `ai_cache_entries` table, unique per
/// `(tenant_id, pattern_signature)`.
///
/// Caches the composed orchestrator result for a bucketized incident
/// pattern so repeat incidents skip the downstream agents entirely.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AiCacheEntry {
    pub id: DbId,
    pub tenant_id: DbId,
    /// Hex SHA-256 over the canonical pattern serialization.
    pub pattern_signature: String,
    pub detection_type: String,
    pub severity: String,
    pub threat_detected: bool,
    pub threat_type: Option<String>,
    pub confidence_score: Option<f64>,
    pub context_summary: Option<String>,
    pub recommended_actions: Option<serde_json::Value>,
    pub report_subject: Option<String>,
    pub report_body: Option<String>,
    pub hit_count: i64,
    pub last_hit_at: Option<Timestamp>,
    pub expires_at: Timestamp,
    pub is_valid: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for upserting a cache entry after an orchestrator round trip.
#[derive(Debug, Clone)]
pub struct NewAiCacheEntry {
    pub tenant_id: DbId,
    pub pattern_signature: String,
    pub detection_type: String,
    pub severity: String,
    pub threat_detected: bool,
    pub threat_type: Option<String>,
    pub confidence_score: Option<f64>,
    pub context_summary: Option<String>,
    pub recommended_actions: Option<serde_json::Value>,
    pub report_subject: Option<String>,
    pub report_body: Option<String>,
}
