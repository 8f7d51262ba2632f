use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use centinela_core::error::CoreError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses
/// of the shape `{"error": ..., "code": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `centinela_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A bad request with per-field details.
    #[error("Validation failed")]
    Validation { details: Vec<String> },

    /// The tenant exceeded its plan-tier request budget. Carries the
    /// values rendered into `Retry-After` and `X-RateLimit-*` headers.
    #[error("Rate limit exceeded")]
    RateLimited {
        tier: String,
        limit: i64,
        retry_after_secs: u64,
        reset_unix: i64,
    },

    /// The ingest queue could not accept the job; the caller retries.
    #[error("Queue error: {0}")]
    Queue(#[from] centinela_queue::QueueError),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Core(core) => core_error_response(core),

            AppError::Database(err) => {
                tracing::error!(error = %err, "Database error");
                opaque_500()
            }

            AppError::Validation { details } => {
                let body = json!({
                    "error": "Validation failed",
                    "code": "VALIDATION_ERROR",
                    "details": details,
                });
                (StatusCode::BAD_REQUEST, axum::Json(body)).into_response()
            }

            AppError::RateLimited {
                tier,
                limit,
                retry_after_secs,
                reset_unix,
            } => {
                let mut headers = HeaderMap::new();
                insert_header(&mut headers, "retry-after", &retry_after_secs.to_string());
                insert_header(&mut headers, "x-ratelimit-limit", &limit.to_string());
                insert_header(&mut headers, "x-ratelimit-remaining", "0");
                insert_header(&mut headers, "x-ratelimit-reset", &reset_unix.to_string());
                insert_header(&mut headers, "x-ratelimit-tier", &tier);

                let body = json!({
                    "error": "Rate limit exceeded",
                    "code": "RATE_LIMITED",
                });
                (StatusCode::TOO_MANY_REQUESTS, headers, axum::Json(body)).into_response()
            }

            AppError::Queue(err) => {
                tracing::error!(error = %err, "Ingest queue unavailable");
                opaque_500()
            }

            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                opaque_500()
            }
        }
    }
}

/// Map a [`CoreError`] to its HTTP rendering.
///
/// Auth failures respond 401 with a stable body and are not logged at
/// error level.
fn core_error_response(core: CoreError) -> Response {
    let (status, code, message) = match &core {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Unauthorized(msg) => {
            tracing::debug!(reason = %msg, "Rejected unauthenticated request");
            (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Invalid or missing API key".to_string(),
            )
        }
        CoreError::RateLimited { retry_after_secs } => (
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            format!("Rate limit exceeded, retry after {retry_after_secs}s"),
        ),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    };

    let body = json!({
        "error": message,
        "code": code,
    });
    (status, axum::Json(body)).into_response()
}

/// Production 5xx bodies are opaque.
fn opaque_500() -> Response {
    let body = json!({
        "error": "An internal error occurred",
        "code": "INTERNAL_ERROR",
    });
    (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response()
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
