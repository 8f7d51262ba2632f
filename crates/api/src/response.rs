//! Shared response envelope types for ingest handlers.
//!
//! Ingest acknowledgements use a fixed `{ok, accepted, job_id(s)}` shape;
//! use these structs instead of ad-hoc `serde_json::json!` so the wire
//! format cannot drift between the single and bulk endpoints.

use serde::Serialize;
use uuid::Uuid;

/// 202 body for `POST /v1/ingest/syslog`.
#[derive(Debug, Serialize)]
pub struct IngestAccepted {
    pub ok: bool,
    pub accepted: bool,
    pub job_id: Uuid,
}

/// 202 body for `POST /v1/ingest/syslog/bulk`.
#[derive(Debug, Serialize)]
pub struct BulkIngestAccepted {
    pub ok: bool,
    /// Number of events enqueued.
    pub accepted: usize,
    pub job_ids: Vec<Uuid>,
}
