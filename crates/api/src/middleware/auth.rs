//! API-key authentication extractor for Axum handlers.

use std::time::Duration;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use centinela_core::api_keys::hash_api_key;
use centinela_core::error::CoreError;
use centinela_core::types::DbId;
use centinela_db::repositories::ApiKeyRepo;

use crate::error::AppError;
use crate::state::AppState;

/// Flat delay before answering a failed lookup, to soften brute-force
/// probing of the key space.
const AUTH_MISS_DELAY: Duration = Duration::from_millis(100);

/// Authenticated tenant extracted from an API key in the `Authorization`
/// header.
///
/// Use this as an extractor parameter in any handler that requires
/// collector authentication:
///
/// ```ignore
/// async fn my_handler(auth: AuthTenant) -> AppResult<Json<()>> {
///     tracing::info!(tenant_id = auth.tenant_id, "handling request");
///     Ok(Json(()))
/// }
/// ```
///
/// The tenant always comes from the key, never from the request body.
#[derive(Debug, Clone)]
pub struct AuthTenant {
    pub tenant_id: DbId,
    pub api_key_id: DbId,
    /// The tenant's plan tier, resolved for the rate limiter.
    pub plan_tier: String,
}

impl FromRequestParts<AppState> for AuthTenant {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| unauthorized("Missing Authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| unauthorized("Invalid Authorization format. Expected: Bearer <key>"))?;

        let key_hash = hash_api_key(token);

        let key = match ApiKeyRepo::find_active_by_hash(&state.pool, &key_hash).await? {
            Some(key) => key,
            None => {
                tokio::time::sleep(AUTH_MISS_DELAY).await;
                return Err(unauthorized("Unknown or inactive API key"));
            }
        };

        let tenant = centinela_db::repositories::TenantRepo::find_by_id(&state.pool, key.tenant_id)
            .await?
            .ok_or_else(|| unauthorized("API key references a missing tenant"))?;

        // The touch is bookkeeping; it must not add latency to the request.
        let pool = state.pool.clone();
        let key_id = key.id;
        tokio::spawn(async move {
            if let Err(e) = ApiKeyRepo::touch_last_used(&pool, key_id).await {
                tracing::warn!(api_key_id = key_id, error = %e, "Failed to touch last_used_at");
            }
        });

        Ok(AuthTenant {
            tenant_id: key.tenant_id,
            api_key_id: key.id,
            plan_tier: tenant.plan_tier,
        })
    }
}

fn unauthorized(reason: &str) -> AppError {
    AppError::Core(CoreError::Unauthorized(reason.to_string()))
}
