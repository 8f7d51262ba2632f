//! Persisted AI agent outputs, keyed to a detection.

use centinela_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `ai_analyses` table: the analyst agent's verdict.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AiAnalysis {
    pub id: DbId,
    pub detection_id: DbId,
    pub tenant_id: DbId,
    pub threat_detected: bool,
    pub threat_type: Option<String>,
    pub confidence_score: Option<f64>,
    pub severity: Option<String>,
    pub context_summary: Option<String>,
    pub iocs: serde_json::Value,
    pub model_used: Option<String>,
    pub tokens_used: Option<i32>,
    pub latency_ms: Option<i32>,
    /// True when the row was materialized from the knowledge cache rather
    /// than a live orchestrator call.
    pub from_cache: bool,
    pub created_at: Timestamp,
}

/// DTO for inserting an analysis row.
#[derive(Debug, Clone)]
pub struct NewAiAnalysis {
    pub detection_id: DbId,
    pub tenant_id: DbId,
    pub threat_detected: bool,
    pub threat_type: Option<String>,
    pub confidence_score: Option<f64>,
    pub severity: Option<String>,
    pub context_summary: Option<String>,
    pub iocs: serde_json::Value,
    pub model_used: Option<String>,
    pub tokens_used: Option<i32>,
    pub latency_ms: Option<i32>,
    pub from_cache: bool,
}

/// A row from the `ai_recommendations` table: the advisor agent's actions.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AiRecommendation {
    pub id: DbId,
    pub detection_id: DbId,
    pub tenant_id: DbId,
    pub urgency: Option<String>,
    pub actions: serde_json::Value,
    pub model_used: Option<String>,
    pub tokens_used: Option<i32>,
    pub latency_ms: Option<i32>,
    pub created_at: Timestamp,
}

/// A row from the `ai_reports` table: the writer agent's human-readable
/// report, plus the safety judge's verdict on it.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AiReport {
    pub id: DbId,
    pub detection_id: DbId,
    pub tenant_id: DbId,
    pub subject: String,
    pub body: String,
    /// `pass` or `fail`. A failed judge flags the report; digests then carry
    /// only the verified content.
    pub judge_result: Option<String>,
    pub judge_reason: Option<String>,
    /// `generated`, `sent`, or `failed`.
    pub status: String,
    pub sent_at: Option<Timestamp>,
    pub model_used: Option<String>,
    pub tokens_used: Option<i32>,
    pub latency_ms: Option<i32>,
    pub created_at: Timestamp,
}
