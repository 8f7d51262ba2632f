use crate::types::DbId;

/// Domain-level error shared by the API, pipeline, and repositories.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Missing, malformed, or inactive API key. Never logged at error level.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Tenant exceeded its plan-tier request budget.
    #[error("Rate limit exceeded: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}
