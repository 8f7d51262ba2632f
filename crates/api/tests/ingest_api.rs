//! Integration tests for the ingest endpoints: auth gate, validation,
//! enqueue-then-ack semantics, and per-tenant rate limiting.
//!
//! Tests that need Redis skip themselves when no instance is reachable.

mod common;

use axum::http::StatusCode;
use sqlx::PgPool;

use centinela_api::config::RateLimitConfig;
use common::{body_json, build_test_app, build_test_app_with_limits, post_json_anon, post_json_auth, seed_tenant_with_key};

fn syslog_body(msg: &str) -> serde_json::Value {
    serde_json::json!({ "raw_message": msg, "source_ip": "10.0.0.7" })
}

// ---------------------------------------------------------------------------
// Auth gate
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn missing_authorization_header_returns_401(pool: PgPool) {
    let Some(app) = build_test_app(pool).await else {
        return;
    };
    let response = post_json_anon(app, "/v1/ingest/syslog", syslog_body("x")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let json = body_json(response).await;
    assert_eq!(json["code"], "UNAUTHORIZED");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn unknown_api_key_returns_401(pool: PgPool) {
    let Some(app) = build_test_app(pool).await else {
        return;
    };
    let response = post_json_auth(
        app,
        "/v1/ingest/syslog",
        "not-a-real-key",
        syslog_body("x"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn revoked_api_key_returns_401(pool: PgPool) {
    let Some(app) = build_test_app(pool.clone()).await else {
        return;
    };
    let (_tenant_id, token) = seed_tenant_with_key(&pool, "free").await;

    // Revoke every key for the tenant.
    sqlx::query("UPDATE api_keys SET is_active = FALSE")
        .execute(&pool)
        .await
        .unwrap();

    let response = post_json_auth(app, "/v1/ingest/syslog", &token, syslog_body("x")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Single ingest
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn valid_event_is_accepted_with_job_id(pool: PgPool) {
    let Some(app) = build_test_app(pool.clone()).await else {
        return;
    };
    let (_tenant_id, token) = seed_tenant_with_key(&pool, "free").await;

    let response = post_json_auth(
        app,
        "/v1/ingest/syslog",
        &token,
        syslog_body("date=2025-06-01 time=12:00:00 type=event subtype=vpn action=ssl-login-fail"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(response.headers().contains_key("x-ratelimit-limit"));
    assert!(response.headers().contains_key("x-ratelimit-remaining"));

    let json = body_json(response).await;
    assert_eq!(json["ok"], true);
    assert_eq!(json["accepted"], true);
    assert!(json["job_id"].is_string());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn empty_raw_message_returns_400_with_details(pool: PgPool) {
    let Some(app) = build_test_app(pool.clone()).await else {
        return;
    };
    let (_tenant_id, token) = seed_tenant_with_key(&pool, "free").await;

    let response =
        post_json_auth(app, "/v1/ingest/syslog", &token, syslog_body("   ")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert!(json["details"].is_array());
}

// ---------------------------------------------------------------------------
// Bulk ingest
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn bulk_accepts_up_to_100_events(pool: PgPool) {
    let Some(app) = build_test_app(pool.clone()).await else {
        return;
    };
    let (_tenant_id, token) = seed_tenant_with_key(&pool, "pro").await;

    let events: Vec<_> = (0..3).map(|i| syslog_body(&format!("line {i}"))).collect();
    let response = post_json_auth(
        app,
        "/v1/ingest/syslog/bulk",
        &token,
        serde_json::json!({ "events": events }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let json = body_json(response).await;
    assert_eq!(json["ok"], true);
    assert_eq!(json["accepted"], 3);
    assert_eq!(json["job_ids"].as_array().unwrap().len(), 3);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn bulk_rejects_whole_batch_on_any_invalid_entry(pool: PgPool) {
    let Some(app) = build_test_app(pool.clone()).await else {
        return;
    };
    let (_tenant_id, token) = seed_tenant_with_key(&pool, "pro").await;

    let response = post_json_auth(
        app,
        "/v1/ingest/syslog/bulk",
        &token,
        serde_json::json!({ "events": [syslog_body("fine"), syslog_body("")] }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    let details = json["details"].as_array().unwrap();
    assert_eq!(details.len(), 1);
    assert!(details[0].as_str().unwrap().contains("events[1]"));
}

#[sqlx::test(migrations = "../db/migrations")]
async fn bulk_rejects_empty_event_list(pool: PgPool) {
    let Some(app) = build_test_app(pool.clone()).await else {
        return;
    };
    let (_tenant_id, token) = seed_tenant_with_key(&pool, "pro").await;

    let response = post_json_auth(
        app,
        "/v1/ingest/syslog/bulk",
        &token,
        serde_json::json!({ "events": [] }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn request_over_the_tier_limit_returns_429_with_headers(pool: PgPool) {
    // A window of 5 requests per minute, like the seed scenario.
    let Some(app) =
        build_test_app_with_limits(pool.clone(), RateLimitConfig::single_tier(5, 60)).await
    else {
        return;
    };
    let (_tenant_id, token) = seed_tenant_with_key(&pool, "free").await;

    for i in 0..5 {
        let response = post_json_auth(
            app.clone(),
            "/v1/ingest/syslog",
            &token,
            syslog_body(&format!("line {i}")),
        )
        .await;
        assert_eq!(
            response.status(),
            StatusCode::ACCEPTED,
            "request {i} should be admitted"
        );
    }

    let response =
        post_json_auth(app, "/v1/ingest/syslog", &token, syslog_body("one too many")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let retry_after: u64 = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .expect("429 must carry Retry-After");
    assert!(retry_after <= 60);
    assert_eq!(
        response.headers().get("x-ratelimit-remaining").unwrap(),
        "0"
    );
    assert_eq!(response.headers().get("x-ratelimit-tier").unwrap(), "free");
}
