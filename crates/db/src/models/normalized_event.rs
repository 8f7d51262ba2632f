//! Normalized event model and DTO.

use centinela_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `normalized_events` table.
///
/// Exactly one exists per successfully parsed raw event, and the row is
/// immutable once written. The free-form `kv` column carries every parsed
/// key=value pair that did not map to a typed column; consumers must treat
/// it as opaque context, never as input to safety-critical decisions.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct NormalizedEvent {
    pub id: DbId,
    pub raw_event_id: DbId,
    pub tenant_id: DbId,
    pub site_id: Option<String>,
    pub source_id: Option<String>,
    pub ts: Timestamp,
    pub vendor: String,
    pub product: String,
    pub event_type: String,
    pub subtype: Option<String>,
    pub action: Option<String>,
    pub severity: String,
    pub src_ip: Option<String>,
    pub dst_ip: Option<String>,
    pub src_user: Option<String>,
    pub dst_user: Option<String>,
    pub src_port: Option<i32>,
    pub dst_port: Option<i32>,
    pub interface: Option<String>,
    pub vdom: Option<String>,
    pub policy_id: Option<String>,
    pub session_id: Option<String>,
    pub message: Option<String>,
    pub kv: serde_json::Value,
    pub created_at: Timestamp,
}

/// DTO for inserting a normalized event (same transaction as the raw-event
/// `parsed` flip).
#[derive(Debug, Clone)]
pub struct NewNormalizedEvent {
    pub raw_event_id: DbId,
    pub tenant_id: DbId,
    pub site_id: Option<String>,
    pub source_id: Option<String>,
    pub ts: Timestamp,
    pub vendor: String,
    pub product: String,
    pub event_type: String,
    pub subtype: Option<String>,
    pub action: Option<String>,
    pub severity: String,
    pub src_ip: Option<String>,
    pub dst_ip: Option<String>,
    pub src_user: Option<String>,
    pub dst_user: Option<String>,
    pub src_port: Option<i32>,
    pub dst_port: Option<i32>,
    pub interface: Option<String>,
    pub vdom: Option<String>,
    pub policy_id: Option<String>,
    pub session_id: Option<String>,
    pub message: Option<String>,
    pub kv: serde_json::Value,
}

/// One aggregation group produced by the rules scan: all events matching a
/// rule's event types within the window, grouped by tenant/site/source and
/// the rule's group key.
#[derive(Debug, Clone, FromRow)]
pub struct RuleGroupRow {
    pub tenant_id: DbId,
    pub site_id: Option<String>,
    pub source_id: Option<String>,
    pub group_key: String,
    pub event_count: i64,
    pub first_event_at: Timestamp,
    pub last_event_at: Timestamp,
    pub src_ips: Option<Vec<String>>,
    pub src_users: Option<Vec<String>>,
    pub event_ids: Vec<DbId>,
}
