//! The recurring pipeline tick.
//!
//! Every `WORKER_INTERVAL_MS` the scheduler runs the stages in order:
//! normalize -> detect -> dispatch-AI -> batch -> send. A Redis lease keeps
//! ticks single-instance across backend replicas, and a stage failure
//! aborts only the current tick; the next tick starts from a clean slate.

use std::sync::Arc;
use std::time::Duration;

use centinela_core::rules::BUILTIN_RULES;
use centinela_core::types::Timestamp;
use centinela_db::repositories::{DetectionRepo, RawEventRepo};
use centinela_db::DbPool;
use redis::aio::ConnectionManager;
use tokio_util::sync::CancellationToken;

use crate::ai::{client, KnowledgeCache, OrchestratorClient};
use crate::batch;
use crate::email::{EmailDispatcher, EmailSender};
use crate::normalize::Normalizer;
use crate::rules;

/// Default tick interval (`WORKER_INTERVAL_MS`).
pub const DEFAULT_INTERVAL_MS: u64 = 60_000;

/// Raw events processed per normalize stage.
const NORMALIZE_BATCH: i64 = 500;

/// Detections handed to the AI stage per tick.
const AI_DISPATCH_LIMIT: i64 = 25;

/// Concurrent orchestrator calls within the AI stage.
const AI_CONCURRENCY: usize = 5;

/// Redis key of the single-instance tick lease.
const LEASE_KEY: &str = "centinela:pipeline:lease";

/// Housekeeping cadence in hours (AI cache cleanup, raw event retention).
const MAINTENANCE_INTERVAL_HOURS: i64 = 24;

/// Raw events older than this many days are deleted.
const RAW_RETENTION_DAYS: i64 = 7;

/// A stage failure, labelled with the stage that raised it.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: &'static str,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
}

fn stage_err<E: std::error::Error + Send + Sync + 'static>(
    stage: &'static str,
) -> impl FnOnce(E) -> StageError {
    move |e| StageError {
        stage,
        source: Box::new(e),
    }
}

/// Drives the recurring pipeline run.
pub struct PipelineScheduler<S: EmailSender> {
    pool: DbPool,
    redis: ConnectionManager,
    normalizer: Normalizer,
    cache: Arc<KnowledgeCache>,
    ai_client: Option<Arc<OrchestratorClient>>,
    email: Option<EmailDispatcher<S>>,
    interval: Duration,
    last_maintenance: tokio::sync::Mutex<Option<Timestamp>>,
}

impl<S: EmailSender + 'static> PipelineScheduler<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: DbPool,
        redis: ConnectionManager,
        normalizer: Normalizer,
        cache: Arc<KnowledgeCache>,
        ai_client: Option<Arc<OrchestratorClient>>,
        email: Option<EmailDispatcher<S>>,
        interval: Duration,
    ) -> Self {
        Self {
            pool,
            redis,
            normalizer,
            cache,
            ai_client,
            email,
            interval,
            last_maintenance: tokio::sync::Mutex::new(None),
        }
    }

    /// Tick interval from `WORKER_INTERVAL_MS`, defaulting to 60 s.
    pub fn interval_from_env() -> Duration {
        let ms = std::env::var("WORKER_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_INTERVAL_MS);
        Duration::from_millis(ms)
    }

    /// Run ticks until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Pipeline scheduler cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(stage = e.stage, error = %e, "Pipeline tick aborted");
                    }
                }
            }
        }
    }

    /// Execute one tick: all stages in order under the instance lease.
    pub async fn tick(&self) -> Result<(), StageError> {
        // Two runs never overlap: the lease outlives a slow tick and the
        // loser of the race just skips its turn.
        let lease_ttl_ms = (self.interval.as_millis() as u64 * 2).max(120_000);
        let lease = match centinela_queue::Lease::acquire(&self.redis, LEASE_KEY, lease_ttl_ms)
            .await
            .map_err(stage_err("lease"))?
        {
            Some(lease) => lease,
            None => {
                tracing::debug!("Pipeline lease held elsewhere, skipping tick");
                return Ok(());
            }
        };

        let result = self.run_stages().await;

        if let Err(e) = lease.release().await {
            tracing::warn!(error = %e, "Failed to release pipeline lease");
        }
        result
    }

    async fn run_stages(&self) -> Result<(), StageError> {
        let normalized = self
            .normalizer
            .normalize_batch(NORMALIZE_BATCH)
            .await
            .map_err(stage_err("normalize"))?;

        let detected = rules::run(&self.pool, BUILTIN_RULES)
            .await
            .map_err(stage_err("detect"))?;

        self.dispatch_ai().await.map_err(stage_err("dispatch-ai"))?;

        let batched = batch::run(&self.pool).await.map_err(stage_err("batch"))?;

        if let Some(email) = &self.email {
            email
                .dispatch_pending()
                .await
                .map_err(stage_err("send"))?;
        } else {
            tracing::debug!("Email delivery not configured, skipping send stage");
        }

        self.maintenance().await.map_err(stage_err("maintenance"))?;

        tracing::debug!(
            normalized = normalized.normalized,
            detections_created = detected.detections_created,
            detections_updated = detected.detections_updated,
            digests_created = batched.digests_created,
            "Pipeline tick complete"
        );
        Ok(())
    }

    /// Enrich high/critical detections that have no analysis yet.
    ///
    /// Orchestrator failures are per-detection: they are logged and the
    /// detection stays eligible for the next tick; they never abort the
    /// stage.
    async fn dispatch_ai(&self) -> Result<(), sqlx::Error> {
        let Some(ai_client) = &self.ai_client else {
            tracing::debug!("AI orchestrator not configured, skipping dispatch");
            return Ok(());
        };

        let pending = DetectionRepo::list_pending_ai(&self.pool, AI_DISPATCH_LIMIT).await?;
        if pending.is_empty() {
            return Ok(());
        }

        for chunk in pending.chunks(AI_CONCURRENCY) {
            let mut set = tokio::task::JoinSet::new();
            for detection in chunk {
                let pool = self.pool.clone();
                let cache = Arc::clone(&self.cache);
                let ai_client = Arc::clone(ai_client);
                let detection = detection.clone();
                set.spawn(async move {
                    let outcome =
                        client::process_detection(&pool, &cache, &ai_client, &detection).await;
                    (detection.id, outcome)
                });
            }

            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((detection_id, Ok(outcome))) => {
                        tracing::info!(detection_id, ?outcome, "AI enrichment finished");
                    }
                    Ok((detection_id, Err(e))) => {
                        tracing::warn!(detection_id, error = %e, "AI enrichment failed");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "AI enrichment task panicked");
                    }
                }
            }
        }
        Ok(())
    }

    /// Daily housekeeping: AI cache cleanup and raw-event retention.
    async fn maintenance(&self) -> Result<(), sqlx::Error> {
        let now = chrono::Utc::now();
        let mut last = self.last_maintenance.lock().await;
        if let Some(prev) = *last {
            if now - prev < chrono::Duration::hours(MAINTENANCE_INTERVAL_HOURS) {
                return Ok(());
            }
        }
        *last = Some(now);
        drop(last);

        let cache_removed = self.cache.cleanup().await?;
        let raw_removed = RawEventRepo::delete_older_than(&self.pool, RAW_RETENTION_DAYS).await?;
        tracing::info!(cache_removed, raw_removed, "Maintenance pass complete");
        Ok(())
    }
}
