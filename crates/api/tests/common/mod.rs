// All functions in this module are shared test helpers. Not every test binary
// uses every helper, so we suppress dead_code warnings at the item level.
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

use centinela_api::config::{RateLimitConfig, ServerConfig};
use centinela_api::middleware::rate_limit::RateLimiter;
use centinela_api::router::build_app_router;
use centinela_api::state::AppState;
use centinela_core::api_keys::generate_api_key;
use centinela_db::repositories::{ApiKeyRepo, TenantRepo};
use centinela_queue::{JobQueue, RedisConfig};

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        rate_limits: RateLimitConfig::from_env(),
    }
}

/// Build the full application router with all middleware layers.
///
/// Returns `None` when Redis is unreachable so tests can skip instead of
/// failing on machines without a local Redis.
pub async fn build_test_app(pool: PgPool) -> Option<Router> {
    build_test_app_with_limits(pool, RateLimitConfig::from_env()).await
}

/// Build the test app with a custom rate-limit tier table.
pub async fn build_test_app_with_limits(
    pool: PgPool,
    rate_limits: RateLimitConfig,
) -> Option<Router> {
    let redis_config = RedisConfig::from_env();
    let redis = match centinela_queue::connect(&redis_config).await {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("skipping: Redis unavailable ({e})");
            return None;
        }
    };

    let mut config = test_config();
    config.rate_limits = rate_limits.clone();

    // Tests share a Redis instance; unique queue and limiter namespaces
    // isolate them from each other.
    let run_id = uuid::Uuid::new_v4();
    let ingest_queue = JobQueue::new(redis.clone(), &format!("ingest-test-{run_id}"));
    let limiter = Arc::new(RateLimiter::with_key_prefix(
        redis.clone(),
        rate_limits,
        format!("centinela:test:ratelimit:{run_id}"),
    ));

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        redis,
        ingest_queue,
        limiter,
    };

    Some(build_app_router(state, &config))
}

/// Seed a tenant plus an active API key; returns `(tenant_id, plaintext)`.
pub async fn seed_tenant_with_key(pool: &PgPool, plan_tier: &str) -> (i64, String) {
    let tenant = TenantRepo::create(pool, "test-tenant", plan_tier, "en", "UTC")
        .await
        .expect("tenant insert should succeed");
    let key = generate_api_key();
    ApiKeyRepo::create(pool, tenant.id, "test-key", &key.hash, &key.prefix)
        .await
        .expect("api key insert should succeed");
    (tenant.id, key.plaintext)
}

// ---------------------------------------------------------------------------
// Shared HTTP test helpers
// ---------------------------------------------------------------------------

/// Collect the response body into a `serde_json::Value`.
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// POST JSON with a bearer token and return the response.
pub async fn post_json_auth(
    app: Router,
    uri: &str,
    token: &str,
    body: serde_json::Value,
) -> axum::response::Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST JSON without any Authorization header.
pub async fn post_json_anon(
    app: Router,
    uri: &str,
    body: serde_json::Value,
) -> axum::response::Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}
