//! Detection model and DTO.

use centinela_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `detections` table.
///
/// A detection is *open* while `reported_digest_id` is NULL; later rule
/// matches for the same `(tenant_id, detection_type, group_key)` update the
/// open row. Once a digest claims the detection the row is frozen.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Detection {
    pub id: DbId,
    pub tenant_id: DbId,
    pub site_id: Option<String>,
    pub source_id: Option<String>,
    /// The producing rule's name, e.g. `vpn_bruteforce`.
    pub detection_type: String,
    pub severity: String,
    pub group_key: String,
    pub window_minutes: i32,
    pub event_count: i64,
    pub first_event_at: Timestamp,
    pub last_event_at: Timestamp,
    pub evidence: serde_json::Value,
    pub related_event_ids: Vec<DbId>,
    pub reported_digest_id: Option<DbId>,
    pub acknowledged: bool,
    pub created_at: Timestamp,
}

/// DTO for inserting a new detection.
#[derive(Debug, Clone)]
pub struct NewDetection {
    pub tenant_id: DbId,
    pub site_id: Option<String>,
    pub source_id: Option<String>,
    pub detection_type: String,
    pub severity: String,
    pub group_key: String,
    pub window_minutes: i32,
    pub event_count: i64,
    pub first_event_at: Timestamp,
    pub last_event_at: Timestamp,
    pub evidence: serde_json::Value,
    pub related_event_ids: Vec<DbId>,
}
