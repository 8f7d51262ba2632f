//! Collector health endpoints.
//!
//! - `GET /healthz` -- liveness: 200 whenever the process is up.
//! - `GET /readyz`  -- readiness: 503 when the buffer or DLQ is saturated.
//! - `GET /metrics` -- full counters snapshot (fixed JSON shape).
//! - `GET /status`  -- terse `healthy|degraded|unhealthy` classification.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use serde_json::json;

use crate::buffer::EventBuffer;
use crate::config::CollectorConfig;
use crate::metrics::MetricsRegistry;
use crate::retry::RetryQueue;

/// Readiness fails above this buffer fill percentage.
const READY_MAX_BUFFER_PERCENT: f64 = 90.0;

/// Readiness fails above this DLQ size.
const READY_MAX_DLQ: usize = 100;

/// Unhealthy above this DLQ size.
const UNHEALTHY_DLQ: usize = 1_000;

/// Shared state behind the health router.
#[derive(Clone)]
pub struct HealthState {
    pub buffer: Arc<EventBuffer>,
    pub retry: Arc<RetryQueue>,
    pub metrics: Arc<MetricsRegistry>,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub max_retries: u32,
}

impl HealthState {
    pub fn new(
        config: &CollectorConfig,
        buffer: Arc<EventBuffer>,
        retry: Arc<RetryQueue>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            buffer,
            retry,
            metrics,
            batch_size: config.batch_size,
            flush_interval_ms: config.flush_interval_ms,
            max_retries: config.max_retries,
        }
    }

    fn is_ready(&self) -> bool {
        self.buffer.usage_percent() <= READY_MAX_BUFFER_PERCENT
            && self.retry.dlq_len() <= READY_MAX_DLQ
    }

    fn classification(&self) -> &'static str {
        let buffer_full = self.buffer.usage_percent() >= 100.0;
        if buffer_full || self.retry.dlq_len() > UNHEALTHY_DLQ {
            "unhealthy"
        } else if !self.is_ready() {
            "degraded"
        } else {
            "healthy"
        }
    }
}

/// GET /healthz -- 200 always while the process runs.
async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

/// GET /readyz -- 200 when accepting load is sensible, else 503.
async fn readyz(State(state): State<HealthState>) -> (StatusCode, Json<serde_json::Value>) {
    let ready = state.is_ready();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = json!({
        "ready": ready,
        "buffer_usage_percent": state.buffer.usage_percent(),
        "retry": {
            "queued": state.retry.len(),
            "dlq": state.retry.dlq_len(),
        },
    });
    (status, Json(body))
}

/// GET /metrics -- the full counters snapshot.
async fn metrics(State(state): State<HealthState>) -> Json<serde_json::Value> {
    Json(state.metrics.snapshot(
        state.buffer.len(),
        state.buffer.capacity(),
        state.retry.len(),
        state.retry.dlq_len(),
        state.batch_size,
        state.flush_interval_ms,
        state.max_retries,
    ))
}

/// GET /status -- terse health classification.
async fn status(State(state): State<HealthState>) -> Json<serde_json::Value> {
    Json(json!({ "status": state.classification() }))
}

/// Build the health router.
pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/status", get(status))
        .with_state(state)
}
