use std::sync::Arc;

use centinela_queue::JobQueue;
use redis::aio::ConnectionManager;

use crate::config::ServerConfig;
use crate::middleware::rate_limit::RateLimiter;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already
/// `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: centinela_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shared Redis connection (queues, rate-limit windows).
    pub redis: ConnectionManager,
    /// The `ingest` queue the front door enqueues into.
    pub ingest_queue: JobQueue,
    /// Per-tenant sliding-window rate limiter.
    pub limiter: Arc<RateLimiter>,
}
