//! Raw event model and DTO.

use centinela_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `raw_events` table: one syslog line exactly as received.
///
/// Mutated once in its lifetime, by the normalizer flipping `parsed` (and
/// possibly recording `parse_error`). Retained for a fixed window and then
/// deleted by the retention sweep.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RawEvent {
    pub id: DbId,
    pub tenant_id: DbId,
    pub site_id: Option<String>,
    pub source_id: Option<String>,
    pub received_at: Timestamp,
    pub source_ip: Option<String>,
    /// `udp`, `tcp`, or `http`.
    pub transport: String,
    pub raw_message: String,
    pub collector_name: Option<String>,
    /// Hex SHA-256 of the ingest payload, carried from `x-payload-sha256`.
    pub payload_sha256: Option<String>,
    pub parsed: bool,
    pub parse_error: Option<String>,
    pub created_at: Timestamp,
}

/// DTO for inserting a raw event from the ingest queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRawEvent {
    pub tenant_id: DbId,
    pub site_id: Option<String>,
    pub source_id: Option<String>,
    pub received_at: Timestamp,
    pub source_ip: Option<String>,
    pub transport: String,
    pub raw_message: String,
    pub collector_name: Option<String>,
    pub payload_sha256: Option<String>,
}
