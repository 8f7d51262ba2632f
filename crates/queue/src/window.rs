//! Sorted-set sliding-window primitives for the tenant rate limiter.
//!
//! The policy (tier limits, headers, fail-open) lives in the API crate;
//! this module only performs the Redis bookkeeping.

use rand::Rng;
use redis::aio::ConnectionManager;

use crate::QueueError;

/// Result of recording one request in a sliding window.
#[derive(Debug, Clone)]
pub struct WindowHit {
    /// Entries present in the window *before* this hit was added. The
    /// caller compares this against its limit.
    pub count_before: i64,
    /// The member added for this hit. Pass it to [`revoke`] when the hit
    /// is rejected so denied requests do not consume budget.
    pub member: String,
}

/// Record a hit in the window and report the pre-add cardinality.
///
/// Runs one atomic pipeline: drop entries older than the window, read the
/// cardinality, add the new member scored by now, refresh the key TTL to
/// `window + 1` seconds. The member carries a probabilistic suffix so two
/// hits in the same millisecond stay distinct.
pub async fn hit(
    conn: &ConnectionManager,
    key: &str,
    window_secs: u64,
) -> Result<WindowHit, QueueError> {
    let now_ms = chrono::Utc::now().timestamp_millis();
    let window_start_ms = now_ms - (window_secs as i64) * 1000;
    let member = format!("{now_ms}-{:08x}", rand::rng().random::<u32>());

    let mut conn = conn.clone();
    let (count_before,): (i64,) = redis::pipe()
        .atomic()
        .cmd("ZREMRANGEBYSCORE")
        .arg(key)
        .arg("-inf")
        .arg(window_start_ms)
        .ignore()
        .cmd("ZCARD")
        .arg(key)
        .cmd("ZADD")
        .arg(key)
        .arg(now_ms)
        .arg(&member)
        .ignore()
        .cmd("EXPIRE")
        .arg(key)
        .arg(window_secs + 1)
        .ignore()
        .query_async(&mut conn)
        .await?;

    Ok(WindowHit {
        count_before,
        member,
    })
}

/// Remove a just-added member so a denied request does not count against
/// the window.
pub async fn revoke(conn: &ConnectionManager, key: &str, member: &str) -> Result<(), QueueError> {
    let mut conn = conn.clone();
    let _: i64 = redis::AsyncCommands::zrem(&mut conn, key, member).await?;
    Ok(())
}

/// Current cardinality of the window (entries not yet expired out).
pub async fn cardinality(conn: &ConnectionManager, key: &str) -> Result<i64, QueueError> {
    let mut conn = conn.clone();
    let n: i64 = redis::AsyncCommands::zcard(&mut conn, key).await?;
    Ok(n)
}
