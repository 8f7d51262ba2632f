//! Server and rate-limit configuration loaded from environment variables.

use std::collections::HashMap;

/// Maximum accepted request body, in bytes.
pub const MAX_BODY_BYTES: usize = 256 * 1024;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8080`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Rate limiter tier table.
    pub rate_limits: RateLimitConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                 |
    /// |------------------------|-------------------------|
    /// | `HOST`                 | `0.0.0.0`               |
    /// | `PORT`                 | `8080`                  |
    /// | `CORS_ORIGINS`         | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                    |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            rate_limits: RateLimitConfig::from_env(),
        }
    }
}

// ---------------------------------------------------------------------------
// Rate limit tiers
// ---------------------------------------------------------------------------

/// Requests allowed per window for one plan tier.
#[derive(Debug, Clone, Copy)]
pub struct TierLimit {
    pub max_requests: i64,
    pub window_secs: u64,
}

/// The tier table applied by the per-tenant rate limiter.
///
/// Defaults: `free=100`, `basic=1000`, `pro=5000`, `enterprise=20000`
/// requests per minute, overridable via `RATE_LIMIT_<TIER>` variables.
/// Unknown tenant tiers fall back to `RATE_LIMIT_DEFAULT_TIER` (default
/// `free`).
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    tiers: HashMap<String, TierLimit>,
    default_tier: String,
}

/// Window applied to every tier.
const WINDOW_SECS: u64 = 60;

impl RateLimitConfig {
    /// Load the tier table from environment variables with defaults.
    pub fn from_env() -> Self {
        let mut tiers = HashMap::new();
        for (tier, default_max) in [
            ("free", 100),
            ("basic", 1_000),
            ("pro", 5_000),
            ("enterprise", 20_000),
        ] {
            let var = format!("RATE_LIMIT_{}", tier.to_ascii_uppercase());
            let max_requests = std::env::var(&var)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_max);
            tiers.insert(
                tier.to_string(),
                TierLimit {
                    max_requests,
                    window_secs: WINDOW_SECS,
                },
            );
        }

        let default_tier = std::env::var("RATE_LIMIT_DEFAULT_TIER")
            .unwrap_or_else(|_| "free".into())
            .to_ascii_lowercase();

        Self {
            tiers,
            default_tier,
        }
    }

    /// Resolve a tenant's plan tier to its limit, falling back to the
    /// default tier for unknown names.
    pub fn for_tier(&self, plan_tier: &str) -> (String, TierLimit) {
        let tier = plan_tier.to_ascii_lowercase();
        if let Some(limit) = self.tiers.get(&tier) {
            return (tier, *limit);
        }
        let fallback = self
            .tiers
            .get(&self.default_tier)
            .copied()
            .unwrap_or(TierLimit {
                max_requests: 100,
                window_secs: WINDOW_SECS,
            });
        (self.default_tier.clone(), fallback)
    }

    /// Build a table with a single `free` tier. Intended for tests that
    /// need a tiny, predictable window.
    pub fn single_tier(free_max: i64, window_secs: u64) -> Self {
        let mut tiers = HashMap::new();
        tiers.insert(
            "free".to_string(),
            TierLimit {
                max_requests: free_max,
                window_secs,
            },
        );
        Self {
            tiers,
            default_tier: "free".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tier_falls_back_to_default() {
        let config = RateLimitConfig::from_env();
        let (tier, limit) = config.for_tier("platinum");
        assert_eq!(tier, "free");
        assert_eq!(limit.max_requests, 100);
        assert_eq!(limit.window_secs, 60);
    }

    #[test]
    fn tier_lookup_is_case_insensitive() {
        let config = RateLimitConfig::from_env();
        let (tier, limit) = config.for_tier("Enterprise");
        assert_eq!(tier, "enterprise");
        assert_eq!(limit.max_requests, 20_000);
    }
}
