//! Tenant model.

use centinela_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `tenants` table.
///
/// Every tenant-scoped record in the system references one of these. The
/// `plan_tier` selects the rate-limit bucket; `default_locale` selects the
/// digest template language.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Tenant {
    pub id: DbId,
    pub name: String,
    /// `active` or `suspended`.
    pub status: String,
    /// `free`, `basic`, `pro`, or `enterprise`.
    pub plan_tier: String,
    pub default_locale: String,
    pub timezone: String,
    pub created_at: Timestamp,
}
