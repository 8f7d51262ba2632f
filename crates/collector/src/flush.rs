//! Flush and retry loops.
//!
//! The flush loop drains the buffer in batches on a timer: bulk upload
//! first, then per-event fallback when the batch fails, with failed
//! events entering the retry queue. The retry loop re-attempts queued
//! events on its own timer and is reentrancy-guarded so a slow pass is
//! never overlapped by the next tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::buffer::{BufferedEvent, EventBuffer};
use crate::config::CollectorConfig;
use crate::forward::{ForwardError, HttpForwarder};
use crate::metrics::MetricsRegistry;
use crate::retry::RetryQueue;

/// Shared context for both loops.
pub struct Flusher {
    pub buffer: Arc<EventBuffer>,
    pub retry: Arc<RetryQueue>,
    pub forwarder: Arc<HttpForwarder>,
    pub metrics: Arc<MetricsRegistry>,
    pub batch_size: usize,
    retry_pass_running: AtomicBool,
}

impl Flusher {
    pub fn new(
        buffer: Arc<EventBuffer>,
        retry: Arc<RetryQueue>,
        forwarder: Arc<HttpForwarder>,
        metrics: Arc<MetricsRegistry>,
        batch_size: usize,
    ) -> Self {
        Self {
            buffer,
            retry,
            forwarder,
            metrics,
            batch_size,
            retry_pass_running: AtomicBool::new(false),
        }
    }

    /// Run the flush loop until cancelled.
    pub async fn run_flush_loop(self: Arc<Self>, config: &CollectorConfig, cancel: CancellationToken) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(config.flush_interval_ms));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Flush loop stopped");
                    break;
                }
                _ = interval.tick() => {
                    self.flush_once().await;
                }
            }
        }
    }

    /// Run the retry loop until cancelled.
    pub async fn run_retry_loop(
        self: Arc<Self>,
        config: &CollectorConfig,
        cancel: CancellationToken,
    ) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(config.retry_check_interval_ms));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Retry loop stopped");
                    break;
                }
                _ = interval.tick() => {
                    self.retry_pass().await;
                }
            }
        }
    }

    /// Drain one batch from the buffer and upload it.
    pub async fn flush_once(&self) {
        let batch = self.buffer.pop_batch(self.batch_size);
        if batch.is_empty() {
            return;
        }

        let started = Instant::now();
        match self.forwarder.send_bulk(&batch).await {
            Ok(()) => {
                self.metrics
                    .record_latency(started.elapsed().as_millis() as u64);
                self.metrics.incr_sent(batch.len() as u64);
                tracing::debug!(count = batch.len(), "Bulk upload succeeded");
            }
            Err(e) => {
                tracing::warn!(
                    count = batch.len(),
                    error = %e,
                    "Bulk upload failed, falling back to per-event posts"
                );
                for event in batch {
                    self.send_one(event, 0).await;
                }
            }
        }
    }

    /// Drain the whole buffer (shutdown path).
    pub async fn flush_all(&self) {
        while !self.buffer.is_empty() {
            self.flush_once().await;
        }
    }

    /// One pass over the events whose retry time has come.
    ///
    /// Guarded so overlapping timer ticks cannot process the same entries
    /// twice; a tick that finds a pass in flight simply skips.
    pub async fn retry_pass(&self) {
        if self
            .retry_pass_running
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            tracing::debug!("Retry pass already running, skipping tick");
            return;
        }

        let ready = self.retry.get_ready();
        if !ready.is_empty() {
            tracing::debug!(count = ready.len(), "Retrying queued events");
        }
        for entry in ready {
            self.send_retry(entry.event, entry.attempts).await;
        }

        self.retry_pass_running.store(false, Ordering::Release);
    }

    /// Final retry pass on shutdown: everything still queued gets one
    /// last attempt regardless of its schedule.
    pub async fn final_retry_pass(&self) {
        for entry in self.retry.drain_all() {
            self.send_retry(entry.event, entry.attempts).await;
        }
    }

    /// Upload one event coming from the flush path (`attempts` so far).
    async fn send_one(&self, event: BufferedEvent, attempts: u32) {
        match self.forwarder.send_single(&event).await {
            Ok(()) => {
                self.metrics.incr_sent(1);
            }
            Err(e) => self.handle_failure(event, attempts + 1, e),
        }
    }

    /// Upload one event coming from the retry queue.
    async fn send_retry(&self, event: BufferedEvent, attempts: u32) {
        match self.forwarder.send_single(&event).await {
            Ok(()) => {
                self.metrics.incr_sent(1);
                self.metrics.incr_retry_success();
            }
            Err(e) => self.handle_failure(event, attempts + 1, e),
        }
    }

    fn handle_failure(&self, event: BufferedEvent, attempts: u32, error: ForwardError) {
        if error.is_retryable() {
            tracing::debug!(attempts, error = %error, "Event upload failed");
            self.retry.enqueue(event, attempts);
        } else {
            // Bad credentials or a rejected payload; retrying cannot
            // succeed.
            tracing::error!(error = %error, "Non-retryable upload failure");
            self.retry.move_to_dlq(event);
        }
    }
}
