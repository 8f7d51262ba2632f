//! HTTP transport to the cloud ingestion API.
//!
//! Bulk upload first (30 s budget); callers fall back to per-event posts
//! (10 s budget) when a batch fails. Every request carries the bearer
//! key, a collector `User-Agent`, and an `x-payload-sha256` digest the
//! backend may use for idempotent dedupe.

use std::time::Duration;

use centinela_core::hashing::sha256_hex;
use serde::Serialize;

use crate::buffer::BufferedEvent;
use crate::config::CollectorConfig;

/// Budget for one bulk upload.
const BULK_TIMEOUT: Duration = Duration::from_secs(30);

/// Budget for one single-event upload.
const SINGLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Error type for upload failures.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// The request never completed (network, DNS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status.
    #[error("Backend returned HTTP {status}")]
    Status { status: u16 },
}

impl ForwardError {
    /// Whether another attempt may succeed.
    ///
    /// Network failures, 429, and 5xx are retryable. Auth rejections
    /// (401/403) and other 4xx are terminal: retrying cannot help and
    /// such events go straight to the DLQ.
    pub fn is_retryable(&self) -> bool {
        match self {
            ForwardError::Request(_) => true,
            ForwardError::Status { status } => *status == 429 || *status >= 500,
        }
    }
}

/// The wire shape of one event, wrapping [`BufferedEvent`] with the
/// collector identity fields.
#[derive(Debug, Serialize)]
struct WireEvent<'a> {
    #[serde(flatten)]
    event: &'a BufferedEvent,
    collector_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    site_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct BulkBody<'a> {
    events: Vec<WireEvent<'a>>,
}

/// Authenticated HTTP forwarder for the ingest endpoints.
pub struct HttpForwarder {
    http: reqwest::Client,
    single_url: String,
    bulk_url: String,
    api_key: String,
    collector_name: String,
    site_id: Option<String>,
}

impl HttpForwarder {
    pub fn new(config: &CollectorConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent())
            .build()
            .expect("Failed to build reqwest HTTP client");

        Self {
            http,
            single_url: format!("{}/v1/ingest/syslog", config.api_url),
            bulk_url: format!("{}/v1/ingest/syslog/bulk", config.api_url),
            api_key: config.api_key.clone(),
            collector_name: config.collector_name.clone(),
            site_id: config.site_id.clone(),
        }
    }

    /// Upload a batch via the bulk endpoint.
    pub async fn send_bulk(&self, events: &[BufferedEvent]) -> Result<(), ForwardError> {
        let body = BulkBody {
            events: events.iter().map(|e| self.wire(e)).collect(),
        };
        self.post(&self.bulk_url, &body, BULK_TIMEOUT).await
    }

    /// Upload one event via the single endpoint.
    pub async fn send_single(&self, event: &BufferedEvent) -> Result<(), ForwardError> {
        let body = self.wire(event);
        self.post(&self.single_url, &body, SINGLE_TIMEOUT).await
    }

    fn wire<'a>(&'a self, event: &'a BufferedEvent) -> WireEvent<'a> {
        WireEvent {
            event,
            collector_name: &self.collector_name,
            site_id: self.site_id.as_deref(),
        }
    }

    async fn post<B: Serialize>(
        &self,
        url: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<(), ForwardError> {
        let payload = serde_json::to_vec(body).expect("wire types are always serializable");
        let digest = sha256_hex(&payload);

        let response = self
            .http
            .post(url)
            .timeout(timeout)
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .header("x-payload-sha256", digest)
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(ForwardError::Status {
            status: status.as_u16(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_matches_the_status_classes() {
        assert!(ForwardError::Status { status: 429 }.is_retryable());
        assert!(ForwardError::Status { status: 500 }.is_retryable());
        assert!(ForwardError::Status { status: 503 }.is_retryable());
        assert!(!ForwardError::Status { status: 401 }.is_retryable());
        assert!(!ForwardError::Status { status: 403 }.is_retryable());
        assert!(!ForwardError::Status { status: 400 }.is_retryable());
    }
}
