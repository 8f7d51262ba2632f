//! Bounded in-memory event buffer.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One received syslog event, as it travels from the servers through the
/// buffer, flush loop, and retry queue.
#[derive(Debug, Clone, Serialize)]
pub struct BufferedEvent {
    pub raw_message: String,
    pub received_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<String>,
    /// `udp` or `tcp`.
    pub transport: &'static str,
    /// Set when the line exceeded the size guard and was cut short.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
    /// Bytes observed before truncation (only meaningful when truncated).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_length: Option<usize>,
}

impl BufferedEvent {
    /// A plain, untruncated event.
    pub fn new(raw_message: String, source_ip: Option<String>, transport: &'static str) -> Self {
        Self {
            raw_message,
            received_at: Utc::now(),
            source_ip,
            transport,
            truncated: false,
            original_length: None,
        }
    }
}

/// Bounded FIFO of received events, shared by the servers (producers) and
/// the flush loop (consumer).
///
/// When full, `push` tail-drops: the *new* event is rejected and the
/// caller increments the dropped counter. Buffered events are never
/// evicted.
pub struct EventBuffer {
    inner: Mutex<VecDeque<BufferedEvent>>,
    capacity: usize,
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
        }
    }

    /// Append an event. Returns `false` (tail-drop) when the buffer is at
    /// capacity.
    pub fn push(&self, event: BufferedEvent) -> bool {
        let mut inner = self.inner.lock().expect("buffer lock poisoned");
        if inner.len() >= self.capacity {
            return false;
        }
        inner.push_back(event);
        true
    }

    /// Remove and return up to `n` of the oldest events.
    pub fn pop_batch(&self, n: usize) -> Vec<BufferedEvent> {
        let mut inner = self.inner.lock().expect("buffer lock poisoned");
        let take = n.min(inner.len());
        inner.drain(..take).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("buffer lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fill level as a percentage of capacity.
    pub fn usage_percent(&self) -> f64 {
        if self.capacity == 0 {
            return 100.0;
        }
        (self.len() as f64 / self.capacity as f64) * 100.0
    }
}
