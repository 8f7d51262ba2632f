//! Job envelope carried through Redis queues.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unit of work on a [`JobQueue`](crate::JobQueue).
///
/// The payload is an opaque JSON value; each consumer deserializes it into
/// its own DTO. `attempts` counts processing attempts so far and drives the
/// retry backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    /// Consumer-facing discriminator, e.g. `"ingest_syslog"`.
    pub kind: String,
    pub payload: serde_json::Value,
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    /// Create a fresh job with zero attempts.
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            payload,
            attempts: 0,
            enqueued_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let job = Job::new("ingest_syslog", serde_json::json!({"raw_message": "x"}));
        let encoded = serde_json::to_string(&job).unwrap();
        let decoded: Job = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.id, job.id);
        assert_eq!(decoded.kind, "ingest_syslog");
        assert_eq!(decoded.attempts, 0);
        assert_eq!(decoded.payload["raw_message"], "x");
    }
}
