//! In-process metrics registry.
//!
//! A single struct of atomic counters, shared by every loop in the
//! process and snapshotted by the health endpoints. Counters hold the
//! invariant `received == sent + failed + dropped + pending`, where
//! `pending` is whatever currently sits in the buffer and retry queue.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

use serde_json::json;

/// Counters for the collector process. Not shared across processes.
pub struct MetricsRegistry {
    started_at: Instant,
    received: AtomicU64,
    sent: AtomicU64,
    /// Events that exhausted their retry budget (now in the DLQ).
    failed: AtomicU64,
    /// Events tail-dropped on a full buffer.
    dropped: AtomicU64,
    retry_success: AtomicU64,
    latency_last_ms: AtomicU64,
    latency_total_ms: AtomicU64,
    latency_count: AtomicU64,
    tcp_connections: AtomicI64,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            received: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            retry_success: AtomicU64::new(0),
            latency_last_ms: AtomicU64::new(0),
            latency_total_ms: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
            tcp_connections: AtomicI64::new(0),
        }
    }

    pub fn incr_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_sent(&self, n: u64) {
        self.sent.fetch_add(n, Ordering::Relaxed);
    }

    pub fn incr_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_retry_success(&self) {
        self.retry_success.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one upload round trip.
    pub fn record_latency(&self, ms: u64) {
        self.latency_last_ms.store(ms, Ordering::Relaxed);
        self.latency_total_ms.fetch_add(ms, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tcp_connection_opened(&self) {
        self.tcp_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tcp_connection_closed(&self) {
        self.tcp_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Full snapshot in the fixed `/metrics` JSON shape.
    #[allow(clippy::too_many_arguments)]
    pub fn snapshot(
        &self,
        buffer_size: usize,
        buffer_max: usize,
        retry_queued: usize,
        dlq_size: usize,
        batch_size: usize,
        flush_interval_ms: u64,
        max_retries: u32,
    ) -> serde_json::Value {
        let uptime_ms = self.started_at.elapsed().as_millis() as u64;
        let uptime_secs = (uptime_ms as f64 / 1000.0).max(0.001);

        let received = self.received();
        let sent = self.sent();
        let failed = self.failed();
        let dropped = self.dropped();
        let pending = buffer_size as u64 + retry_queued as u64;

        let latency_count = self.latency_count.load(Ordering::Relaxed);
        let avg_ms = if latency_count > 0 {
            self.latency_total_ms.load(Ordering::Relaxed) as f64 / latency_count as f64
        } else {
            0.0
        };

        let attempts = sent + failed;
        let success_rate = if attempts > 0 {
            sent as f64 / attempts as f64
        } else {
            1.0
        };

        json!({
            "uptime_ms": uptime_ms,
            "uptime_human": human_duration(uptime_ms),
            "events": {
                "received": received,
                "sent": sent,
                "failed": failed,
                "dropped": dropped,
                "pending": pending,
            },
            "retries": {
                "queued": retry_queued,
                "success": self.retry_success.load(Ordering::Relaxed),
                "dlq": dlq_size,
            },
            "latency": {
                "avg_ms": avg_ms,
                "last_ms": self.latency_last_ms.load(Ordering::Relaxed),
            },
            "rates": {
                "events_per_second": received as f64 / uptime_secs,
                "success_rate": success_rate,
            },
            "buffer": {
                "size": buffer_size,
                "max": buffer_max,
                "dropped": dropped,
            },
            "connections": {
                "tcp": self.tcp_connections.load(Ordering::Relaxed),
            },
            "config": {
                "batch_size": batch_size,
                "flush_interval_ms": flush_interval_ms,
                "max_retries": max_retries,
            },
        })
    }
}

/// Render a millisecond uptime as `1h 2m 3s`.
fn human_duration(ms: u64) -> String {
    let total_secs = ms / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_has_the_fixed_field_names() {
        let metrics = MetricsRegistry::new();
        metrics.incr_received();
        metrics.incr_sent(1);
        metrics.record_latency(42);

        let snapshot = metrics.snapshot(3, 100, 2, 1, 50, 5000, 3);

        for path in [
            "uptime_ms",
            "uptime_human",
            "events",
            "retries",
            "latency",
            "rates",
            "buffer",
            "connections",
            "config",
        ] {
            assert!(snapshot.get(path).is_some(), "missing field {path}");
        }
        assert_eq!(snapshot["events"]["received"], 1);
        assert_eq!(snapshot["events"]["sent"], 1);
        assert_eq!(snapshot["events"]["pending"], 5); // 3 buffered + 2 retrying
        assert_eq!(snapshot["retries"]["dlq"], 1);
        assert_eq!(snapshot["latency"]["last_ms"], 42);
        assert_eq!(snapshot["buffer"]["max"], 100);
        assert_eq!(snapshot["connections"]["tcp"], 0);
        assert_eq!(snapshot["config"]["batch_size"], 50);
    }

    #[test]
    fn success_rate_is_one_before_any_attempt() {
        let metrics = MetricsRegistry::new();
        let snapshot = metrics.snapshot(0, 10, 0, 0, 10, 1000, 3);
        assert_eq!(snapshot["rates"]["success_rate"], 1.0);
    }

    #[test]
    fn human_duration_formats_each_magnitude() {
        assert_eq!(human_duration(9_000), "9s");
        assert_eq!(human_duration(75_000), "1m 15s");
        assert_eq!(human_duration(3_723_000), "1h 2m 3s");
    }

    #[test]
    fn accounting_invariant_holds_across_transitions() {
        // received == sent + failed + dropped + pending
        let metrics = MetricsRegistry::new();
        for _ in 0..10 {
            metrics.incr_received();
        }
        metrics.incr_sent(6);
        metrics.incr_failed();
        metrics.incr_dropped();

        // 2 events still pending (1 buffered + 1 retrying).
        let snapshot = metrics.snapshot(1, 100, 1, 1, 10, 1000, 3);
        let events = &snapshot["events"];
        assert_eq!(
            events["received"].as_u64().unwrap(),
            events["sent"].as_u64().unwrap()
                + events["failed"].as_u64().unwrap()
                + events["dropped"].as_u64().unwrap()
                + events["pending"].as_u64().unwrap()
        );
    }
}
