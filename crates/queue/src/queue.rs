//! Redis list/zset job queue with delayed retries.
//!
//! Ready jobs live in a list (`LPUSH`/`BRPOP`). Failed jobs are either
//! parked in a delayed sorted set scored by their next-attempt time, or --
//! once the attempt budget is spent -- appended to a failed-jobs list for
//! operator inspection.

use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::job::Job;
use crate::QueueError;

/// Maximum processing attempts before a job is moved to the failed list.
pub const MAX_ATTEMPTS: u32 = 3;

/// Base delay for the exponential retry backoff.
const RETRY_BASE_SECS: u64 = 1;

/// What happened to a job handed to [`JobQueue::retry_or_fail`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Parked in the delayed set; will re-enter the ready list at the
    /// contained unix-millisecond timestamp.
    Delayed { next_attempt_at_ms: i64 },
    /// Attempt budget spent; appended to the failed-jobs list.
    Failed,
}

/// A named Redis job queue.
#[derive(Clone)]
pub struct JobQueue {
    conn: ConnectionManager,
    ready_key: String,
    delayed_key: String,
    failed_key: String,
}

impl JobQueue {
    /// Create a handle to the queue with the given name.
    pub fn new(conn: ConnectionManager, name: &str) -> Self {
        Self {
            conn,
            ready_key: format!("centinela:queue:{name}"),
            delayed_key: format!("centinela:queue:{name}:delayed"),
            failed_key: format!("centinela:queue:{name}:failed"),
        }
    }

    /// Enqueue a new job. Returns the stored envelope (with its id).
    pub async fn push(
        &self,
        kind: &str,
        payload: serde_json::Value,
    ) -> Result<Job, QueueError> {
        let job = Job::new(kind, payload);
        self.push_job(&job).await?;
        Ok(job)
    }

    /// Enqueue an existing envelope (used when promoting delayed jobs).
    pub async fn push_job(&self, job: &Job) -> Result<(), QueueError> {
        let encoded = serde_json::to_string(job)?;
        let mut conn = self.conn.clone();
        let _: () = conn.lpush(&self.ready_key, encoded).await?;
        Ok(())
    }

    /// Block up to `timeout_secs` for the next ready job.
    ///
    /// Returns `None` on timeout so consumer loops can poll their shutdown
    /// flag between waits. Undecodable entries are dropped with a warning
    /// rather than wedging the queue.
    pub async fn pop(&self, timeout_secs: f64) -> Result<Option<Job>, QueueError> {
        let mut conn = self.conn.clone();
        let entry: Option<(String, String)> = conn.brpop(&self.ready_key, timeout_secs).await?;
        match entry {
            Some((_key, encoded)) => match serde_json::from_str::<Job>(&encoded) {
                Ok(job) => Ok(Some(job)),
                Err(e) => {
                    tracing::warn!(error = %e, queue = %self.ready_key, "Dropping undecodable job");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Record a failed attempt: park the job for retry with exponential
    /// backoff (1 s, 2 s, 4 s, ...) or move it to the failed list once
    /// [`MAX_ATTEMPTS`] is reached.
    pub async fn retry_or_fail(
        &self,
        mut job: Job,
        error: &str,
    ) -> Result<RetryOutcome, QueueError> {
        job.attempts += 1;
        let mut conn = self.conn.clone();

        if job.attempts >= MAX_ATTEMPTS {
            tracing::warn!(
                job_id = %job.id,
                kind = %job.kind,
                attempts = job.attempts,
                error,
                "Job exhausted retries, moving to failed list"
            );
            let encoded = serde_json::to_string(&job)?;
            let _: () = conn.lpush(&self.failed_key, encoded).await?;
            return Ok(RetryOutcome::Failed);
        }

        let delay_secs = RETRY_BASE_SECS << (job.attempts - 1);
        let next_attempt_at_ms = Utc::now().timestamp_millis() + (delay_secs as i64) * 1000;
        let encoded = serde_json::to_string(&job)?;
        let _: () = conn
            .zadd(&self.delayed_key, encoded, next_attempt_at_ms)
            .await?;

        tracing::debug!(
            job_id = %job.id,
            kind = %job.kind,
            attempts = job.attempts,
            delay_secs,
            error,
            "Job parked for retry"
        );
        Ok(RetryOutcome::Delayed { next_attempt_at_ms })
    }

    /// Move due delayed jobs back onto the ready list. Returns how many
    /// were promoted.
    pub async fn promote_due(&self) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        let now_ms = Utc::now().timestamp_millis();
        let due: Vec<String> = conn
            .zrangebyscore(&self.delayed_key, "-inf", now_ms)
            .await?;

        let mut promoted = 0;
        for encoded in due {
            // ZREM first: if another worker grabbed the same member the
            // removal count is 0 and we skip it, so a job is promoted once.
            let removed: i64 = conn.zrem(&self.delayed_key, &encoded).await?;
            if removed > 0 {
                let _: () = conn.lpush(&self.ready_key, &encoded).await?;
                promoted += 1;
            }
        }
        Ok(promoted)
    }

    /// Number of ready jobs.
    pub async fn len(&self) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        let n: u64 = conn.llen(&self.ready_key).await?;
        Ok(n)
    }

    /// Whether the ready list is empty.
    pub async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len().await? == 0)
    }

    /// Number of jobs in the failed list.
    pub async fn failed_count(&self) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        let n: u64 = conn.llen(&self.failed_key).await?;
        Ok(n)
    }
}
