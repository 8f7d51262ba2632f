//! Redis-backed infrastructure shared by the API and the backend worker.
//!
//! This crate provides the building blocks the rest of the system queues
//! and coordinates through:
//!
//! - [`RedisConfig`] / [`connect`] -- a single managed connection handle,
//!   injected everywhere and closed exactly once on shutdown.
//! - [`JobQueue`] -- push/pop job queue with delayed retries and a
//!   failed-jobs list.
//! - [`window`] -- sorted-set sliding-window primitives for the tenant rate
//!   limiter.
//! - [`Lease`] -- a best-effort single-instance lock for the pipeline tick.
//! - [`dedupe`] -- short-lived payload-digest guard for ingest idempotency.

pub mod dedupe;
pub mod job;
pub mod lease;
pub mod queue;
pub mod window;

pub use job::Job;
pub use lease::Lease;
pub use queue::{JobQueue, RetryOutcome};

use redis::aio::ConnectionManager;

/// Error type for queue and key-value operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Underlying Redis failure (connection, protocol, timeout).
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A job envelope could not be encoded or decoded.
    #[error("Job serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Redis connection settings loaded from environment variables.
///
/// | Variable         | Required | Default     |
/// |------------------|----------|-------------|
/// | `REDIS_HOST`     | no       | `127.0.0.1` |
/// | `REDIS_PORT`     | no       | `6379`      |
/// | `REDIS_PASSWORD` | no       | --           |
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
}

impl RedisConfig {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: std::env::var("REDIS_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(6379),
            password: std::env::var("REDIS_PASSWORD").ok(),
        }
    }

    /// Render the `redis://` connection URL.
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!("redis://:{password}@{}:{}/", self.host, self.port),
            None => format!("redis://{}:{}/", self.host, self.port),
        }
    }
}

/// Open a managed Redis connection.
///
/// [`ConnectionManager`] reconnects transparently and is cheap to clone;
/// every clone shares the same underlying connection.
pub async fn connect(config: &RedisConfig) -> Result<ConnectionManager, QueueError> {
    let client = redis::Client::open(config.url().as_str())?;
    let manager = ConnectionManager::new(client).await?;
    Ok(manager)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_without_password() {
        let config = RedisConfig {
            host: "redis.internal".into(),
            port: 6380,
            password: None,
        };
        assert_eq!(config.url(), "redis://redis.internal:6380/");
    }

    #[test]
    fn url_with_password() {
        let config = RedisConfig {
            host: "localhost".into(),
            port: 6379,
            password: Some("hunter2".into()),
        };
        assert_eq!(config.url(), "redis://:hunter2@localhost:6379/");
    }
}
