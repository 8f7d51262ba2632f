//! AI orchestrator client.
//!
//! For each high-severity detection: check the knowledge cache, and only
//! on a miss POST the detection envelope to the downstream orchestrator
//! mesh. Persist whatever comes back (analysis, recommendation, report)
//! and refresh the cache. Transport errors are returned to the caller and
//! never written to the cache.

use std::time::Duration;

use centinela_db::models::ai::NewAiAnalysis;
use centinela_db::models::ai_cache::NewAiCacheEntry;
use centinela_db::models::detection::Detection;
use centinela_db::models::normalized_event::NormalizedEvent;
use centinela_db::models::raw_event::RawEvent;
use centinela_db::repositories::{AiRepo, NormalizedEventRepo, RawEventRepo};
use centinela_db::DbPool;
use serde::{Deserialize, Serialize};

use crate::ai::cache::KnowledgeCache;

/// Request budget for one orchestrator round trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Sample events attached to the orchestrator envelope, per kind.
const MAX_SAMPLE_EVENTS: usize = 10;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for orchestrator calls.
#[derive(Debug, thiserror::Error)]
pub enum AiClientError {
    /// The HTTP request failed (network, DNS, timeout, cancellation).
    #[error("Orchestrator request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The orchestrator answered with a non-2xx status.
    #[error("Orchestrator returned HTTP {0}")]
    HttpStatus(u16),

    /// A database read/write around the call failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

// ---------------------------------------------------------------------------
// Wire envelopes
// ---------------------------------------------------------------------------

/// `POST /v1/ata/orchestrate` request body.
#[derive(Debug, Serialize)]
struct OrchestrateRequest<'a> {
    tenant_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    site_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_id: Option<&'a str>,
    detection: DetectionEnvelope<'a>,
    raw_events: &'a [RawEvent],
    normalized_events: &'a [NormalizedEvent],
}

#[derive(Debug, Serialize)]
struct DetectionEnvelope<'a> {
    detection_type: &'a str,
    severity: &'a str,
    detected_at: centinela_core::types::Timestamp,
    group_key: &'a str,
    evidence: &'a serde_json::Value,
}

/// Orchestrator response: either a no-threat verdict or the composed
/// analysis/recommendations/judge/report bundle.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestrateResponse {
    pub status: Option<String>,
    pub request_id: Option<String>,
    pub analysis: Option<AnalysisPayload>,
    pub recommendations: Option<RecommendationsPayload>,
    pub judge: Option<JudgePayload>,
    pub report: Option<ReportPayload>,
    pub latency_ms: Option<i64>,
}

impl OrchestrateResponse {
    fn is_no_threat(&self) -> bool {
        self.status.as_deref() == Some("no_threat_detected")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisPayload {
    pub threat_detected: bool,
    pub threat_type: Option<String>,
    pub confidence_score: Option<f64>,
    pub severity: Option<String>,
    pub context_summary: Option<String>,
    #[serde(default)]
    pub iocs: Vec<String>,
    pub model_used: Option<String>,
    pub tokens_used: Option<i32>,
    pub latency_ms: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationsPayload {
    pub urgency: Option<String>,
    #[serde(default)]
    pub actions: Vec<RecommendedAction>,
    pub model_used: Option<String>,
    pub tokens_used: Option<i32>,
    pub latency_ms: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedAction {
    pub priority: Option<i32>,
    pub action: String,
    #[serde(default)]
    pub cli_commands: Vec<String>,
    pub risk_level: Option<String>,
    pub reversible: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JudgePayload {
    /// `pass` or `fail`.
    pub result: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportPayload {
    pub subject: String,
    pub body: String,
    pub model_used: Option<String>,
    pub tokens_used: Option<i32>,
    pub latency_ms: Option<i32>,
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// What happened for one detection handed to [`process_detection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiOutcome {
    /// Served from the knowledge cache; no downstream traffic.
    FromCache,
    /// The orchestrator saw no threat; nothing cached.
    NoThreat,
    /// Full round trip: outputs persisted and the cache refreshed.
    Analyzed,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the downstream orchestrator mesh.
pub struct OrchestratorClient {
    http: reqwest::Client,
    base_url: String,
}

impl OrchestratorClient {
    /// Create a client for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Build from `ATA_ORCHESTRATOR_URL`, or `None` when AI enrichment is
    /// not configured.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("ATA_ORCHESTRATOR_URL").ok()?;
        Some(Self::new(base_url))
    }

    /// One raw orchestrator round trip.
    async fn orchestrate(
        &self,
        request: &OrchestrateRequest<'_>,
    ) -> Result<OrchestrateResponse, AiClientError> {
        let url = format!("{}/v1/ata/orchestrate", self.base_url.trim_end_matches('/'));
        let response = self.http.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            return Err(AiClientError::HttpStatus(response.status().as_u16()));
        }
        Ok(response.json::<OrchestrateResponse>().await?)
    }
}

// ---------------------------------------------------------------------------
// Detection processing
// ---------------------------------------------------------------------------

/// Enrich one detection: cache-check, fan-out, persist, cache-refresh.
///
/// Errors (HTTP failure, timeout) propagate to the caller; the cache is
/// only written after a successful, non-no-threat response, so a failed
/// call can never poison it.
pub async fn process_detection(
    pool: &DbPool,
    cache: &KnowledgeCache,
    client: &OrchestratorClient,
    detection: &Detection,
) -> Result<AiOutcome, AiClientError> {
    let signature = KnowledgeCache::signature_for(detection);

    // Cache hit: materialize the stored verdict, no downstream call.
    if let Some(entry) = cache.lookup(detection.tenant_id, &signature).await? {
        persist_from_cache(pool, detection, &entry).await?;
        return Ok(AiOutcome::FromCache);
    }

    // Cache miss: assemble the envelope with sample events.
    let normalized = sample_normalized(pool, detection).await?;
    let raw = sample_raw(pool, &normalized).await?;

    let request = OrchestrateRequest {
        tenant_id: detection.tenant_id,
        site_id: detection.site_id.as_deref(),
        source_id: detection.source_id.as_deref(),
        detection: DetectionEnvelope {
            detection_type: &detection.detection_type,
            severity: &detection.severity,
            detected_at: detection.created_at,
            group_key: &detection.group_key,
            evidence: &detection.evidence,
        },
        raw_events: &raw,
        normalized_events: &normalized,
    };

    let response = client.orchestrate(&request).await?;

    if response.is_no_threat() {
        // Record the verdict so the detection is not re-dispatched, but
        // leave the cache untouched.
        AiRepo::insert_analysis(
            pool,
            &NewAiAnalysis {
                detection_id: detection.id,
                tenant_id: detection.tenant_id,
                threat_detected: false,
                threat_type: None,
                confidence_score: None,
                severity: None,
                context_summary: None,
                iocs: serde_json::json!([]),
                model_used: None,
                tokens_used: None,
                latency_ms: response.latency_ms.map(|ms| ms as i32),
                from_cache: false,
            },
        )
        .await?;
        return Ok(AiOutcome::NoThreat);
    }

    persist_response(pool, detection, &response).await?;
    cache
        .store(&compose_cache_entry(detection, &signature, &response))
        .await?;

    Ok(AiOutcome::Analyzed)
}

/// Up to [`MAX_SAMPLE_EVENTS`] normalized events backing the detection.
async fn sample_normalized(
    pool: &DbPool,
    detection: &Detection,
) -> Result<Vec<NormalizedEvent>, sqlx::Error> {
    let ids: Vec<i64> = detection
        .related_event_ids
        .iter()
        .copied()
        .take(MAX_SAMPLE_EVENTS)
        .collect();
    if ids.is_empty() {
        return Ok(vec![]);
    }
    NormalizedEventRepo::find_by_ids(pool, &ids).await
}

/// The raw rows behind the sampled normalized events.
async fn sample_raw(
    pool: &DbPool,
    normalized: &[NormalizedEvent],
) -> Result<Vec<RawEvent>, sqlx::Error> {
    let ids: Vec<i64> = normalized
        .iter()
        .map(|n| n.raw_event_id)
        .take(MAX_SAMPLE_EVENTS)
        .collect();
    if ids.is_empty() {
        return Ok(vec![]);
    }
    RawEventRepo::find_by_ids(pool, &ids).await
}

/// Materialize a cached verdict as persisted rows for this detection.
async fn persist_from_cache(
    pool: &DbPool,
    detection: &Detection,
    entry: &centinela_db::models::ai_cache::AiCacheEntry,
) -> Result<(), sqlx::Error> {
    AiRepo::insert_analysis(
        pool,
        &NewAiAnalysis {
            detection_id: detection.id,
            tenant_id: detection.tenant_id,
            threat_detected: entry.threat_detected,
            threat_type: entry.threat_type.clone(),
            confidence_score: entry.confidence_score,
            severity: Some(entry.severity.clone()),
            context_summary: entry.context_summary.clone(),
            iocs: serde_json::json!([]),
            model_used: None,
            tokens_used: None,
            latency_ms: None,
            from_cache: true,
        },
    )
    .await?;

    if let Some(actions) = &entry.recommended_actions {
        AiRepo::insert_recommendation(
            pool,
            detection.id,
            detection.tenant_id,
            None,
            actions,
            None,
            None,
            None,
        )
        .await?;
    }

    if let (Some(subject), Some(body)) = (&entry.report_subject, &entry.report_body) {
        AiRepo::insert_report(
            pool,
            detection.id,
            detection.tenant_id,
            subject,
            body,
            Some("pass"),
            None,
            None,
            None,
            None,
        )
        .await?;
    }

    Ok(())
}

/// Persist a live orchestrator response.
async fn persist_response(
    pool: &DbPool,
    detection: &Detection,
    response: &OrchestrateResponse,
) -> Result<(), sqlx::Error> {
    let judge_failed = response
        .judge
        .as_ref()
        .is_some_and(|j| j.result.eq_ignore_ascii_case("fail"));

    if let Some(analysis) = &response.analysis {
        AiRepo::insert_analysis(
            pool,
            &NewAiAnalysis {
                detection_id: detection.id,
                tenant_id: detection.tenant_id,
                threat_detected: analysis.threat_detected,
                threat_type: analysis.threat_type.clone(),
                confidence_score: analysis.confidence_score,
                severity: analysis.severity.clone(),
                context_summary: analysis.context_summary.clone(),
                iocs: serde_json::to_value(&analysis.iocs)
                    .unwrap_or_else(|_| serde_json::json!([])),
                model_used: analysis.model_used.clone(),
                tokens_used: analysis.tokens_used,
                latency_ms: analysis.latency_ms,
                from_cache: false,
            },
        )
        .await?;
    }

    if let Some(recs) = &response.recommendations {
        if !recs.actions.is_empty() {
            let actions = serde_json::to_value(&recs.actions)
                .unwrap_or_else(|_| serde_json::json!([]));
            AiRepo::insert_recommendation(
                pool,
                detection.id,
                detection.tenant_id,
                recs.urgency.as_deref(),
                &actions,
                recs.model_used.as_deref(),
                recs.tokens_used,
                recs.latency_ms,
            )
            .await?;
        }
    }

    if let Some(report) = &response.report {
        let (judge_result, judge_reason) = match &response.judge {
            Some(j) => (Some(j.result.as_str()), j.reason.as_deref()),
            None => (None, None),
        };
        AiRepo::insert_report(
            pool,
            detection.id,
            detection.tenant_id,
            &report.subject,
            &report.body,
            judge_result,
            judge_reason,
            report.model_used.as_deref(),
            report.tokens_used,
            report.latency_ms,
        )
        .await?;
        if judge_failed {
            tracing::warn!(
                detection_id = detection.id,
                "Safety judge failed the AI report; only verified content may be delivered"
            );
        }
    }

    Ok(())
}

/// Compose the cache entry from a live response.
///
/// When the safety judge failed the bundle, CLI commands are stripped
/// from the cached actions and the report is withheld, so later cache
/// hits only replay verified content.
fn compose_cache_entry(
    detection: &Detection,
    signature: &str,
    response: &OrchestrateResponse,
) -> NewAiCacheEntry {
    let judge_failed = response
        .judge
        .as_ref()
        .is_some_and(|j| j.result.eq_ignore_ascii_case("fail"));

    let analysis = response.analysis.as_ref();

    let recommended_actions = response.recommendations.as_ref().map(|recs| {
        let actions: Vec<RecommendedAction> = recs
            .actions
            .iter()
            .cloned()
            .map(|mut a| {
                if judge_failed {
                    a.cli_commands.clear();
                }
                a
            })
            .collect();
        serde_json::to_value(actions).unwrap_or_else(|_| serde_json::json!([]))
    });

    let (report_subject, report_body) = match (&response.report, judge_failed) {
        (Some(report), false) => (Some(report.subject.clone()), Some(report.body.clone())),
        _ => (None, None),
    };

    NewAiCacheEntry {
        tenant_id: detection.tenant_id,
        pattern_signature: signature.to_string(),
        detection_type: detection.detection_type.clone(),
        severity: detection.severity.clone(),
        threat_detected: analysis.map(|a| a.threat_detected).unwrap_or(true),
        threat_type: analysis.and_then(|a| a.threat_type.clone()),
        confidence_score: analysis.and_then(|a| a.confidence_score),
        context_summary: analysis.and_then(|a| a.context_summary.clone()),
        recommended_actions,
        report_subject,
        report_body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn detection() -> Detection {
        Detection {
            id: 7,
            tenant_id: 1,
            site_id: None,
            source_id: None,
            detection_type: "vpn_bruteforce".to_string(),
            severity: "high".to_string(),
            group_key: "192.168.100.50".to_string(),
            window_minutes: 15,
            event_count: 6,
            first_event_at: Utc::now(),
            last_event_at: Utc::now(),
            evidence: serde_json::json!({"event_count": 6}),
            related_event_ids: vec![],
            reported_digest_id: None,
            acknowledged: false,
            created_at: Utc::now(),
        }
    }

    fn full_response(judge_result: &str) -> OrchestrateResponse {
        serde_json::from_value(serde_json::json!({
            "request_id": "req-1",
            "analysis": {
                "threat_detected": true,
                "threat_type": "credential_stuffing",
                "confidence_score": 0.93,
                "severity": "high",
                "context_summary": "Repeated SSL VPN failures from one source",
                "iocs": ["192.168.100.50"],
                "model_used": "analyst-1",
                "tokens_used": 812,
                "latency_ms": 1400
            },
            "recommendations": {
                "urgency": "high",
                "actions": [{
                    "priority": 1,
                    "action": "Block the offending source address",
                    "cli_commands": ["config firewall address"],
                    "risk_level": "low",
                    "reversible": true
                }],
                "model_used": "advisor-1",
                "tokens_used": 420,
                "latency_ms": 900
            },
            "judge": { "result": judge_result, "reason": null },
            "report": {
                "subject": "VPN brute force against site",
                "body": "Full report text",
                "model_used": "writer-1",
                "tokens_used": 300,
                "latency_ms": 700
            },
            "latency_ms": 3100
        }))
        .unwrap()
    }

    #[test]
    fn no_threat_status_is_detected() {
        let response: OrchestrateResponse = serde_json::from_value(serde_json::json!({
            "status": "no_threat_detected",
            "request_id": "req-2",
            "latency_ms": 120
        }))
        .unwrap();
        assert!(response.is_no_threat());
        assert!(response.analysis.is_none());
    }

    #[test]
    fn cache_entry_keeps_report_when_judge_passes() {
        let entry = compose_cache_entry(&detection(), &"e".repeat(64), &full_response("pass"));
        assert!(entry.threat_detected);
        assert_eq!(
            entry.report_subject.as_deref(),
            Some("VPN brute force against site")
        );
        let actions = entry.recommended_actions.unwrap();
        assert_eq!(actions[0]["cli_commands"][0], "config firewall address");
    }

    #[test]
    fn judge_failure_strips_cli_commands_and_report() {
        let entry = compose_cache_entry(&detection(), &"e".repeat(64), &full_response("fail"));
        assert!(entry.report_subject.is_none());
        assert!(entry.report_body.is_none());
        let actions = entry.recommended_actions.unwrap();
        assert_eq!(actions[0]["cli_commands"].as_array().unwrap().len(), 0);
        // The action description itself survives.
        assert_eq!(actions[0]["action"], "Block the offending source address");
    }
}
