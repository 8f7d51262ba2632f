//! Retry queue with exponential backoff and a dead letter queue.

use std::sync::Arc;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::buffer::BufferedEvent;
use crate::metrics::MetricsRegistry;

/// An event waiting for its next delivery attempt.
#[derive(Debug, Clone)]
pub struct RetryEntry {
    pub event: BufferedEvent,
    /// Delivery attempts made so far (>= 1 when queued).
    pub attempts: u32,
    pub next_retry_at: DateTime<Utc>,
}

/// Events that exhausted their retry budget wait here and are reported
/// via metrics and the shutdown log. Never dropped silently.
pub struct RetryQueue {
    entries: Mutex<Vec<RetryEntry>>,
    dlq: Mutex<Vec<BufferedEvent>>,
    max_retries: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    metrics: Arc<MetricsRegistry>,
}

impl RetryQueue {
    pub fn new(
        max_retries: u32,
        base_delay_ms: u64,
        max_delay_ms: u64,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            dlq: Mutex::new(Vec::new()),
            max_retries,
            base_delay_ms,
            max_delay_ms,
            metrics,
        }
    }

    /// Queue an event for its next attempt, or move it to the DLQ once
    /// `attempts` exceeds the retry budget.
    ///
    /// The delay doubles per attempt, capped at the configured maximum,
    /// with +/-20% jitter to spread reconnect storms.
    pub fn enqueue(&self, event: BufferedEvent, attempts: u32) {
        if attempts > self.max_retries {
            self.move_to_dlq(event);
            return;
        }

        let delay_ms = self.delay_with_jitter(attempts);
        let entry = RetryEntry {
            event,
            attempts,
            next_retry_at: Utc::now() + Duration::milliseconds(delay_ms as i64),
        };

        tracing::debug!(attempts, delay_ms, "Event queued for retry");
        self.entries.lock().expect("retry lock poisoned").push(entry);
    }

    /// Send an event straight to the DLQ (non-retryable failure).
    pub fn move_to_dlq(&self, event: BufferedEvent) {
        tracing::warn!(
            transport = event.transport,
            "Event exhausted retries, moving to dead letter queue"
        );
        self.dlq.lock().expect("dlq lock poisoned").push(event);
        self.metrics.incr_failed();
    }

    /// Atomically extract every entry whose retry time has come.
    pub fn get_ready(&self) -> Vec<RetryEntry> {
        let now = Utc::now();
        let mut entries = self.entries.lock().expect("retry lock poisoned");
        let (ready, waiting): (Vec<_>, Vec<_>) =
            entries.drain(..).partition(|e| e.next_retry_at <= now);
        *entries = waiting;
        ready
    }

    /// Extract every queued entry regardless of schedule (final shutdown
    /// pass).
    pub fn drain_all(&self) -> Vec<RetryEntry> {
        let mut entries = self.entries.lock().expect("retry lock poisoned");
        entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("retry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dlq_len(&self) -> usize {
        self.dlq.lock().expect("dlq lock poisoned").len()
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Exponential backoff with +/-20% jitter:
    /// `min(base * 2^(attempts-1), max) * U(0.8, 1.2)`.
    fn delay_with_jitter(&self, attempts: u32) -> u64 {
        let exponent = attempts.saturating_sub(1).min(20);
        let base = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        let jitter: f64 = rand::rng().random_range(0.8..=1.2);
        (base as f64 * jitter) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(max_retries: u32) -> RetryQueue {
        RetryQueue::new(max_retries, 1_000, 30_000, Arc::new(MetricsRegistry::new()))
    }

    fn event() -> BufferedEvent {
        BufferedEvent::new("line".to_string(), None, "udp")
    }

    #[test]
    fn delay_doubles_within_jitter_bounds() {
        let q = queue(5);
        for (attempts, expected_ms) in [(1u32, 1_000f64), (2, 2_000.0), (3, 4_000.0)] {
            let delay = q.delay_with_jitter(attempts) as f64;
            assert!(
                delay >= expected_ms * 0.8 && delay <= expected_ms * 1.2,
                "attempt {attempts}: delay {delay} outside +/-20% of {expected_ms}"
            );
        }
    }

    #[test]
    fn delay_caps_at_the_configured_maximum() {
        let q = queue(50);
        // 2^19 seconds of base 1000ms would overflow the cap by far.
        let delay = q.delay_with_jitter(20) as f64;
        assert!(delay <= 30_000.0 * 1.2);
    }

    #[test]
    fn entries_become_ready_only_at_their_deadline() {
        let q = queue(5);
        q.enqueue(event(), 3); // ~4s out
        assert!(q.get_ready().is_empty(), "future entries must not be ready");
        assert_eq!(q.len(), 1);

        // Force the deadline into the past.
        {
            let mut entries = q.entries.lock().unwrap();
            entries[0].next_retry_at = Utc::now() - Duration::seconds(1);
        }
        let ready = q.get_ready();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].attempts, 3);
        assert!(q.is_empty());
    }

    #[test]
    fn exceeding_the_budget_moves_the_event_to_the_dlq() {
        let q = queue(2);
        q.enqueue(event(), 3); // attempts > max_retries
        assert_eq!(q.len(), 0);
        assert_eq!(q.dlq_len(), 1);
    }

    #[test]
    fn drain_all_ignores_schedules() {
        let q = queue(5);
        q.enqueue(event(), 1);
        q.enqueue(event(), 2);
        assert_eq!(q.drain_all().len(), 2);
        assert!(q.is_empty());
    }
}
