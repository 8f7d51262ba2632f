//! `centinela-api` -- ingestion front door binary.
//!
//! # Environment variables
//!
//! | Variable         | Required | Default     | Description                |
//! |------------------|----------|-------------|----------------------------|
//! | `DATABASE_URL`   | yes      | --          | PostgreSQL connection URL  |
//! | `REDIS_HOST`     | no       | `127.0.0.1` | Redis host                 |
//! | `REDIS_PORT`     | no       | `6379`      | Redis port                 |
//! | `REDIS_PASSWORD` | no       | --          | Redis password             |
//! | `PORT`           | no       | `8080`      | HTTP bind port             |
//! | `CORS_ORIGINS`   | no       | dev origin  | Comma-separated origins    |
//! | `RATE_LIMIT_*`   | no       | tier table  | Per-tier requests/minute   |

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use centinela_api::config::ServerConfig;
use centinela_api::middleware::rate_limit::RateLimiter;
use centinela_api::router::build_app_router;
use centinela_api::state::AppState;
use centinela_queue::{JobQueue, RedisConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "centinela_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| {
        tracing::error!("DATABASE_URL environment variable is required");
        std::process::exit(1);
    });

    let pool = match centinela_db::create_pool(&database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            std::process::exit(1);
        }
    };
    if let Err(e) = centinela_db::health_check(&pool).await {
        tracing::error!(error = %e, "Database health check failed");
        std::process::exit(1);
    }
    if let Err(e) = centinela_db::run_migrations(&pool).await {
        tracing::error!(error = %e, "Failed to run database migrations");
        std::process::exit(1);
    }
    tracing::info!("Database ready");

    // --- Redis (ingest queue + rate-limit windows) ---
    let redis_config = RedisConfig::from_env();
    let redis = match centinela_queue::connect(&redis_config).await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to Redis");
            std::process::exit(1);
        }
    };
    tracing::info!(host = %redis_config.host, "Redis connection established");

    let ingest_queue = JobQueue::new(redis.clone(), "ingest");
    let limiter = Arc::new(RateLimiter::new(
        redis.clone(),
        config.rate_limits.clone(),
    ));

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        redis,
        ingest_queue,
        limiter,
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().unwrap_or_else(|e| {
            tracing::error!(error = %e, host = %config.host, "Invalid HOST address");
            std::process::exit(1);
        }),
        config.port,
    );
    tracing::info!(%addr, "Starting ingestion front door");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "Failed to bind to address");
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
        std::process::exit(2);
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
