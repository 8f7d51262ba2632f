//! API key model.

use centinela_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `api_keys` table.
///
/// **Note:** only the SHA-256 digest of the key is stored; the plaintext is
/// shown to the operator once at provisioning time and never persisted.
/// `key_hash` is never serialized to responses.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ApiKey {
    pub id: DbId,
    pub tenant_id: DbId,
    #[serde(skip_serializing)]
    pub key_hash: String,
    /// First characters of the plaintext, for human identification.
    pub key_prefix: String,
    pub name: String,
    pub is_active: bool,
    pub last_used_at: Option<Timestamp>,
    pub created_at: Timestamp,
}
