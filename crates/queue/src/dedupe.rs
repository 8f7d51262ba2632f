//! Short-lived payload-digest guard for ingest idempotency.
//!
//! Collectors send an `x-payload-sha256` header with every upload. The
//! ingest worker uses that digest to suppress exact duplicates delivered
//! within a small window (at-least-once transport, retried batches).

use redis::aio::ConnectionManager;

use crate::QueueError;

/// How long a payload digest blocks duplicates, in seconds.
pub const DEDUPE_TTL_SECS: u64 = 300;

/// Claim a payload digest. Returns `true` if this is the first sighting
/// within the TTL window, `false` for a duplicate.
pub async fn claim(
    conn: &ConnectionManager,
    digest: &str,
) -> Result<bool, QueueError> {
    let key = format!("centinela:ingest:dedupe:{digest}");
    let mut conn = conn.clone();
    let outcome: Option<String> = redis::cmd("SET")
        .arg(&key)
        .arg(1)
        .arg("NX")
        .arg("EX")
        .arg(DEDUPE_TTL_SECS)
        .query_async(&mut conn)
        .await?;
    Ok(outcome.is_some())
}
