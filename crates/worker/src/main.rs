//! `centinela-worker` -- backend pipeline worker binary.
//!
//! Runs the ingest queue consumers and the recurring pipeline scheduler
//! (normalize -> detect -> dispatch-AI -> batch -> send) in one process.
//! Multiple instances may run side by side: queue consumption is
//! naturally shared and the pipeline tick is guarded by a Redis lease.
//!
//! # Environment variables
//!
//! | Variable               | Required | Default     | Description                         |
//! |------------------------|----------|-------------|-------------------------------------|
//! | `DATABASE_URL`         | yes      | --          | PostgreSQL connection URL           |
//! | `REDIS_HOST`/`_PORT`   | no       | localhost   | Redis connection                    |
//! | `WORKER_INTERVAL_MS`   | no       | `60000`     | Pipeline tick interval              |
//! | `INGEST_CONCURRENCY`   | no       | `10`        | Parallel ingest consumers           |
//! | `ATA_ORCHESTRATOR_URL` | no       | --          | AI orchestrator base URL            |
//! | `AI_CACHE_TTL_DAYS`    | no       | `30`        | Knowledge cache entry lifetime      |
//! | `SMTP_*`               | no       | --          | Digest email transport (see email)  |

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use centinela_pipeline::ai::{KnowledgeCache, OrchestratorClient};
use centinela_pipeline::email::{EmailConfig, EmailDispatcher, SmtpSender};
use centinela_pipeline::fortigate::FortigateParser;
use centinela_pipeline::ingest::{IngestWorker, DEFAULT_CONCURRENCY};
use centinela_pipeline::normalize::Normalizer;
use centinela_pipeline::scheduler::PipelineScheduler;
use centinela_queue::{JobQueue, RedisConfig};

/// How long shutdown waits for in-flight work before giving up.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "centinela_worker=debug,centinela_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

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
    if let Err(e) = centinela_db::run_migrations(&pool).await {
        tracing::error!(error = %e, "Failed to run database migrations");
        std::process::exit(1);
    }
    tracing::info!("Database ready");

    // --- Redis ---
    let redis_config = RedisConfig::from_env();
    let redis = match centinela_queue::connect(&redis_config).await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to Redis");
            std::process::exit(1);
        }
    };
    tracing::info!(host = %redis_config.host, "Redis connection established");

    // --- Ingest consumers ---
    let concurrency: usize = std::env::var("INGEST_CONCURRENCY")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_CONCURRENCY);
    let ingest_queue = JobQueue::new(redis.clone(), "ingest");
    let ingest_worker = IngestWorker::new(
        pool.clone(),
        ingest_queue.clone(),
        redis.clone(),
        concurrency,
    );

    // --- Pipeline stages ---
    let normalizer = Normalizer::new(pool.clone(), Arc::new(FortigateParser));
    let cache = Arc::new(KnowledgeCache::new(
        pool.clone(),
        KnowledgeCache::ttl_from_env(),
    ));

    let ai_client = match OrchestratorClient::from_env() {
        Some(client) => {
            tracing::info!("AI orchestrator configured");
            Some(Arc::new(client))
        }
        None => {
            tracing::warn!("ATA_ORCHESTRATOR_URL not set -- AI enrichment disabled");
            None
        }
    };

    let email = match EmailConfig::from_env() {
        Some(config) => {
            let recipient = config.recipient.clone();
            tracing::info!(recipient = %recipient, "SMTP digest delivery configured");
            Some(EmailDispatcher::new(
                pool.clone(),
                SmtpSender::new(config),
                recipient,
            ))
        }
        None => {
            tracing::warn!("SMTP_HOST not set -- digest emails disabled");
            None
        }
    };

    let interval = PipelineScheduler::<SmtpSender>::interval_from_env();
    let scheduler = PipelineScheduler::new(
        pool.clone(),
        redis.clone(),
        normalizer,
        cache,
        ai_client,
        email,
        interval,
    );

    tracing::info!(
        ingest_concurrency = concurrency,
        interval_ms = interval.as_millis() as u64,
        "Starting backend worker"
    );

    // --- Run until a termination signal ---
    let cancel = CancellationToken::new();

    let ingest_handle = tokio::spawn(ingest_worker.run(cancel.clone()));
    let scheduler_cancel = cancel.clone();
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(scheduler_cancel).await;
    });

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, draining in-flight work");
    cancel.cancel();

    let drain = async {
        let _ = ingest_handle.await;
        let _ = scheduler_handle.await;
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await.is_err() {
        tracing::warn!("Shutdown timed out with work still in flight");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM.
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
            tracing::info!("Received SIGINT (Ctrl-C)");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM");
        }
    }
}
