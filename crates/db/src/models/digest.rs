//! Digest and email delivery models.

use centinela_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `digests` table: one consolidated alert message covering
/// a set of detections for a tenant. The only customer-visible unit.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Digest {
    pub id: DbId,
    pub tenant_id: DbId,
    pub window_start: Timestamp,
    pub window_end: Timestamp,
    /// Max severity over the member detections.
    pub severity: String,
    pub detection_count: i32,
    pub event_count: i64,
    pub subject: String,
    pub body_text: String,
    pub body_html: Option<String>,
    pub locale: String,
    pub created_at: Timestamp,
}

/// DTO for inserting a digest.
#[derive(Debug, Clone)]
pub struct NewDigest {
    pub tenant_id: DbId,
    pub window_start: Timestamp,
    pub window_end: Timestamp,
    pub severity: String,
    pub detection_count: i32,
    pub event_count: i64,
    pub subject: String,
    pub body_text: String,
    pub body_html: Option<String>,
    pub locale: String,
}

/// A row from the `email_deliveries` table.
///
/// A digest counts as delivered once at least one `status = 'sent'` row
/// exists; the dispatcher never sends a digest twice.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct EmailDelivery {
    pub id: DbId,
    pub digest_id: DbId,
    pub tenant_id: DbId,
    pub recipient: String,
    pub provider_message_id: Option<String>,
    /// `pending`, `sent`, or `failed`.
    pub status: String,
    pub error: Option<String>,
    pub sent_at: Option<Timestamp>,
    pub created_at: Timestamp,
}
