//! Ingest queue consumers.
//!
//! Pulls jobs from the `ingest` queue and writes one raw event per job.
//! Transient failures go back through the queue's retry machinery (3
//! attempts, exponential backoff base 1 s); exhausted jobs land in the
//! failed-jobs list. Exact duplicates within the dedupe window (matched
//! by the collector's payload digest) are dropped.

use std::time::Duration;

use centinela_db::models::raw_event::NewRawEvent;
use centinela_db::repositories::RawEventRepo;
use centinela_db::DbPool;
use centinela_queue::{dedupe, Job, JobQueue};
use redis::aio::ConnectionManager;
use tokio_util::sync::CancellationToken;

/// Default number of concurrent consumers.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// How long one `BRPOP` blocks before the consumer re-checks shutdown.
const POP_TIMEOUT_SECS: f64 = 1.0;

/// How often delayed (retrying) jobs are promoted back to ready.
const PROMOTE_INTERVAL: Duration = Duration::from_secs(1);

/// Consumer pool over the ingest queue.
pub struct IngestWorker {
    pool: DbPool,
    queue: JobQueue,
    redis: ConnectionManager,
    concurrency: usize,
}

impl IngestWorker {
    pub fn new(pool: DbPool, queue: JobQueue, redis: ConnectionManager, concurrency: usize) -> Self {
        Self {
            pool,
            queue,
            redis,
            concurrency,
        }
    }

    /// Run the consumer pool until cancelled. In-flight jobs complete
    /// before the workers exit.
    pub async fn run(self, cancel: CancellationToken) {
        let mut handles = Vec::with_capacity(self.concurrency + 1);

        for worker_idx in 0..self.concurrency {
            let pool = self.pool.clone();
            let queue = self.queue.clone();
            let redis = self.redis.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                consumer_loop(worker_idx, pool, queue, redis, cancel).await;
            }));
        }

        // One promoter per pool moves due retries back to the ready list.
        {
            let queue = self.queue.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                promoter_loop(queue, cancel).await;
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
        tracing::info!("Ingest worker pool stopped");
    }
}

async fn consumer_loop(
    worker_idx: usize,
    pool: DbPool,
    queue: JobQueue,
    redis: ConnectionManager,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(worker_idx, "Ingest consumer cancelled");
                break;
            }
            popped = queue.pop(POP_TIMEOUT_SECS) => {
                match popped {
                    Ok(Some(job)) => {
                        process_job(&pool, &queue, &redis, job).await;
                    }
                    Ok(None) => {
                        // Timeout; loop to re-check the cancel token.
                    }
                    Err(e) => {
                        tracing::error!(worker_idx, error = %e, "Ingest queue pop failed");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}

async fn promoter_loop(queue: JobQueue, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(PROMOTE_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = queue.promote_due().await {
                    tracing::error!(error = %e, "Failed to promote delayed ingest jobs");
                }
            }
        }
    }
}

/// Handle one job: decode, dedupe, persist, or hand back for retry.
async fn process_job(pool: &DbPool, queue: &JobQueue, redis: &ConnectionManager, job: Job) {
    let event: NewRawEvent = match serde_json::from_value(job.payload.clone()) {
        Ok(event) => event,
        Err(e) => {
            // Malformed payloads can never succeed; fail them immediately
            // rather than burning retry attempts.
            tracing::error!(job_id = %job.id, error = %e, "Undecodable ingest payload");
            let mut dead = job;
            dead.attempts = centinela_queue::queue::MAX_ATTEMPTS;
            let _ = queue.retry_or_fail(dead, "undecodable payload").await;
            return;
        }
    };

    if let Some(digest) = &event.payload_sha256 {
        match dedupe::claim(redis, digest).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(job_id = %job.id, digest, "Duplicate ingest payload dropped");
                return;
            }
            // Dedupe is best-effort; an unavailable store must not block
            // ingestion.
            Err(e) => {
                tracing::warn!(error = %e, "Dedupe check failed, accepting event");
            }
        }
    }

    match RawEventRepo::insert(pool, &event).await {
        Ok(raw) => {
            tracing::debug!(
                job_id = %job.id,
                raw_event_id = raw.id,
                tenant_id = raw.tenant_id,
                "Raw event persisted"
            );
        }
        Err(e) => {
            let error = e.to_string();
            if let Err(retry_err) = queue.retry_or_fail(job, &error).await {
                tracing::error!(error = %retry_err, "Failed to park ingest job for retry");
            }
        }
    }
}
