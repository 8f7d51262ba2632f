//! Ingest endpoint handlers.
//!
//! Both endpoints follow enqueue-then-ack: the payload is validated,
//! pushed onto the `ingest` queue, and acknowledged with 202. Persistence
//! is the ingest worker's job. The tenant always comes from the
//! authenticated key; a tenant id in the body is ignored.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use centinela_core::types::Timestamp;
use centinela_db::models::raw_event::NewRawEvent;
use chrono::Utc;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthTenant;
use crate::middleware::rate_limit::{RateLimitDecision, RateLimitInfo};
use crate::response::{BulkIngestAccepted, IngestAccepted};
use crate::state::AppState;

/// Maximum events accepted in one bulk request.
const MAX_BULK_EVENTS: usize = 100;

/// Queue job kind for syslog ingestion.
pub const JOB_KIND_INGEST_SYSLOG: &str = "ingest_syslog";

/// Body of `POST /v1/ingest/syslog` (and each entry of the bulk variant).
#[derive(Debug, Clone, Deserialize)]
pub struct IngestSyslogRequest {
    pub raw_message: String,
    pub received_at: Option<Timestamp>,
    pub source_ip: Option<String>,
    pub site_id: Option<String>,
    pub source_id: Option<String>,
    pub collector_name: Option<String>,
    /// `udp` or `tcp` as observed by the collector; defaults to `http`
    /// for direct API submissions.
    pub transport: Option<String>,
}

/// Body of `POST /v1/ingest/syslog/bulk`.
#[derive(Debug, Deserialize)]
pub struct BulkIngestRequest {
    pub events: Vec<IngestSyslogRequest>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /v1/ingest/syslog -- enqueue a single syslog event, ack 202.
pub async fn ingest_syslog(
    State(state): State<AppState>,
    auth: AuthTenant,
    headers: HeaderMap,
    Json(req): Json<IngestSyslogRequest>,
) -> AppResult<(StatusCode, HeaderMap, Json<IngestAccepted>)> {
    let limit_info = enforce_rate_limit(&state, &auth).await?;

    if let Err(detail) = validate_event(&req, None) {
        return Err(AppError::Validation {
            details: vec![detail],
        });
    }

    let payload = to_raw_event(&auth, req, payload_sha256(&headers));
    let job = state
        .ingest_queue
        .push(JOB_KIND_INGEST_SYSLOG, serde_json::to_value(&payload).map_err(internal)?)
        .await?;

    tracing::debug!(tenant_id = auth.tenant_id, job_id = %job.id, "Enqueued syslog event");

    let mut response_headers = HeaderMap::new();
    limit_info.apply(&mut response_headers);

    Ok((
        StatusCode::ACCEPTED,
        response_headers,
        Json(IngestAccepted {
            ok: true,
            accepted: true,
            job_id: job.id,
        }),
    ))
}

/// POST /v1/ingest/syslog/bulk -- enqueue 1–100 events, ack 202.
///
/// Validation is all-or-nothing: any invalid entry rejects the whole batch
/// with per-index details and nothing is enqueued.
pub async fn ingest_syslog_bulk(
    State(state): State<AppState>,
    auth: AuthTenant,
    headers: HeaderMap,
    Json(req): Json<BulkIngestRequest>,
) -> AppResult<(StatusCode, HeaderMap, Json<BulkIngestAccepted>)> {
    let limit_info = enforce_rate_limit(&state, &auth).await?;

    if req.events.is_empty() {
        return Err(AppError::Validation {
            details: vec!["events must contain at least 1 entry".to_string()],
        });
    }
    if req.events.len() > MAX_BULK_EVENTS {
        return Err(AppError::Validation {
            details: vec![format!(
                "events must contain at most {MAX_BULK_EVENTS} entries, got {}",
                req.events.len()
            )],
        });
    }

    let details: Vec<String> = req
        .events
        .iter()
        .enumerate()
        .filter_map(|(i, event)| validate_event(event, Some(i)).err())
        .collect();
    if !details.is_empty() {
        return Err(AppError::Validation { details });
    }

    // The digest header covers the whole batch body, not one event, so it
    // is not attached per event; dedupe applies to single submissions only.
    let mut job_ids = Vec::with_capacity(req.events.len());
    for event in req.events {
        let payload = to_raw_event(&auth, event, None);
        let job = state
            .ingest_queue
            .push(JOB_KIND_INGEST_SYSLOG, serde_json::to_value(&payload).map_err(internal)?)
            .await?;
        job_ids.push(job.id);
    }

    tracing::debug!(
        tenant_id = auth.tenant_id,
        count = job_ids.len(),
        "Enqueued bulk syslog events"
    );

    let mut response_headers = HeaderMap::new();
    limit_info.apply(&mut response_headers);

    Ok((
        StatusCode::ACCEPTED,
        response_headers,
        Json(BulkIngestAccepted {
            ok: true,
            accepted: job_ids.len(),
            job_ids,
        }),
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Run the tenant rate limiter and convert a denial into the 429 error.
async fn enforce_rate_limit(state: &AppState, auth: &AuthTenant) -> AppResult<RateLimitInfo> {
    match state.limiter.check(auth.tenant_id, &auth.plan_tier).await {
        RateLimitDecision::Allowed(info) => Ok(info),
        RateLimitDecision::Denied(info) => Err(AppError::RateLimited {
            tier: info.tier,
            limit: info.limit,
            retry_after_secs: info.retry_after_secs,
            reset_unix: info.reset_unix,
        }),
    }
}

/// Validate one event, labelling errors with the bulk index when present.
fn validate_event(event: &IngestSyslogRequest, index: Option<usize>) -> Result<(), String> {
    let label = match index {
        Some(i) => format!("events[{i}].raw_message"),
        None => "raw_message".to_string(),
    };
    if event.raw_message.trim().is_empty() {
        return Err(format!("{label} must be a non-empty string"));
    }
    Ok(())
}

/// Build the queue payload. The tenant comes from the auth context only.
fn to_raw_event(
    auth: &AuthTenant,
    event: IngestSyslogRequest,
    payload_sha256: Option<String>,
) -> NewRawEvent {
    NewRawEvent {
        tenant_id: auth.tenant_id,
        site_id: event.site_id,
        source_id: event.source_id,
        received_at: event.received_at.unwrap_or_else(Utc::now),
        source_ip: event.source_ip,
        transport: event.transport.unwrap_or_else(|| "http".to_string()),
        raw_message: event.raw_message,
        collector_name: event.collector_name,
        payload_sha256,
    }
}

/// Extract the collector's payload digest header, if present.
fn payload_sha256(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-payload-sha256")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn internal(e: serde_json::Error) -> AppError {
    AppError::Internal(format!("Failed to encode job payload: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(raw: &str) -> IngestSyslogRequest {
        IngestSyslogRequest {
            raw_message: raw.to_string(),
            received_at: None,
            source_ip: None,
            site_id: None,
            source_id: None,
            collector_name: None,
            transport: None,
        }
    }

    #[test]
    fn empty_raw_message_is_rejected() {
        assert!(validate_event(&event(""), None).is_err());
        assert!(validate_event(&event("   "), None).is_err());
        assert!(validate_event(&event("date=2025-06-01"), None).is_ok());
    }

    #[test]
    fn bulk_validation_errors_carry_the_index() {
        let err = validate_event(&event(""), Some(3)).unwrap_err();
        assert!(err.contains("events[3].raw_message"));
    }

    #[test]
    fn transport_defaults_to_http() {
        let auth = AuthTenant {
            tenant_id: 1,
            api_key_id: 1,
            plan_tier: "free".to_string(),
        };
        let raw = to_raw_event(&auth, event("msg"), None);
        assert_eq!(raw.transport, "http");
        assert_eq!(raw.tenant_id, 1);
    }
}
