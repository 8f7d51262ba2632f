//! Per-tenant sliding-window rate limiter.
//!
//! Backed by a Redis sorted set per tenant (see `centinela_queue::window`).
//! The limiter is **fail-open**: any Redis error or a check exceeding the
//! 1-second budget allows the request and increments a dedicated counter,
//! so an unavailable limiter degrades to "no limiting" instead of an
//! outage.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue};
use centinela_core::types::DbId;
use centinela_queue::window;
use redis::aio::ConnectionManager;

use crate::config::RateLimitConfig;

/// Budget for one limiter round trip. Exceeding it fails open.
const CHECK_TIMEOUT: Duration = Duration::from_secs(1);

/// Outcome of a rate-limit check.
#[derive(Debug, Clone)]
pub enum RateLimitDecision {
    /// Request admitted. Carries the values for `X-RateLimit-*` headers.
    Allowed(RateLimitInfo),
    /// Request rejected with 429.
    Denied(RateLimitInfo),
}

/// Header values describing the tenant's current window.
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    pub tier: String,
    pub limit: i64,
    pub remaining: i64,
    /// Unix seconds when the oldest window entry ages out.
    pub reset_unix: i64,
    pub retry_after_secs: u64,
}

impl RateLimitInfo {
    /// Render the `X-RateLimit-*` headers for an admitted request.
    pub fn apply(&self, headers: &mut HeaderMap) {
        insert(headers, "x-ratelimit-limit", &self.limit.to_string());
        insert(headers, "x-ratelimit-remaining", &self.remaining.to_string());
        insert(headers, "x-ratelimit-reset", &self.reset_unix.to_string());
        insert(headers, "x-ratelimit-tier", &self.tier);
    }
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

/// Default namespace for the per-tenant window keys.
const DEFAULT_KEY_PREFIX: &str = "centinela:ratelimit";

/// Sliding-window limiter over the shared Redis connection.
pub struct RateLimiter {
    conn: ConnectionManager,
    config: RateLimitConfig,
    key_prefix: String,
    /// Requests admitted because the limiter itself failed.
    fail_open_count: AtomicU64,
}

impl RateLimiter {
    pub fn new(conn: ConnectionManager, config: RateLimitConfig) -> Self {
        Self::with_key_prefix(conn, config, DEFAULT_KEY_PREFIX)
    }

    /// Use a custom key namespace. Tests use this to isolate themselves on
    /// a shared Redis instance.
    pub fn with_key_prefix(
        conn: ConnectionManager,
        config: RateLimitConfig,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            conn,
            config,
            key_prefix: key_prefix.into(),
            fail_open_count: AtomicU64::new(0),
        }
    }

    /// Check (and count) one request for a tenant.
    ///
    /// Denied requests have their window entry revoked so they do not
    /// consume budget.
    pub async fn check(&self, tenant_id: DbId, plan_tier: &str) -> RateLimitDecision {
        let (tier, limit) = self.config.for_tier(plan_tier);
        let key = format!("{}:{tenant_id}", self.key_prefix);

        let hit =
            match tokio::time::timeout(CHECK_TIMEOUT, window::hit(&self.conn, &key, limit.window_secs))
                .await
            {
                Ok(Ok(hit)) => hit,
                Ok(Err(e)) => {
                    return self.fail_open(tier, limit.max_requests, &e.to_string());
                }
                Err(_) => {
                    return self.fail_open(tier, limit.max_requests, "limiter check timed out");
                }
            };

        let now_unix = chrono::Utc::now().timestamp();
        let reset_unix = now_unix + limit.window_secs as i64;

        if hit.count_before >= limit.max_requests {
            // Roll back the entry we just added; a 429 must not consume
            // budget. Best effort: if the revoke fails the entry ages out
            // with the window anyway.
            if let Err(e) = window::revoke(&self.conn, &key, &hit.member).await {
                tracing::warn!(tenant_id, error = %e, "Failed to revoke rate-limit entry");
            }
            return RateLimitDecision::Denied(RateLimitInfo {
                tier,
                limit: limit.max_requests,
                remaining: 0,
                reset_unix,
                retry_after_secs: limit.window_secs,
            });
        }

        let remaining = (limit.max_requests - hit.count_before - 1).max(0);
        RateLimitDecision::Allowed(RateLimitInfo {
            tier,
            limit: limit.max_requests,
            remaining,
            reset_unix,
            retry_after_secs: 0,
        })
    }

    /// Explicit fail-open path: log, count, allow.
    fn fail_open(&self, tier: String, limit: i64, reason: &str) -> RateLimitDecision {
        let total = self.fail_open_count.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::warn!(reason, fail_open_total = total, "Rate limiter failed open");
        RateLimitDecision::Allowed(RateLimitInfo {
            tier,
            limit,
            remaining: limit,
            reset_unix: chrono::Utc::now().timestamp(),
            retry_after_secs: 0,
        })
    }

    /// How many requests have been admitted on the fail-open path.
    pub fn fail_open_total(&self) -> u64 {
        self.fail_open_count.load(Ordering::Relaxed)
    }
}
