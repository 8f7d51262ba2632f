//! Single-instance lease for the pipeline scheduler.
//!
//! When several backend instances run, only the holder of the lease may
//! execute a pipeline tick. The lease is a plain `SET NX PX` with a random
//! token; release only deletes the key if the token still matches, so an
//! expired-and-reacquired lease is never released by the old holder.

use redis::aio::ConnectionManager;
use uuid::Uuid;

use crate::QueueError;

/// A held lease. Dropping it without [`release`](Lease::release) lets the
/// TTL reclaim the lock.
pub struct Lease {
    conn: ConnectionManager,
    key: String,
    token: String,
}

impl Lease {
    /// Try to acquire `key` for `ttl_ms` milliseconds.
    ///
    /// Returns `None` when another instance holds the lease.
    pub async fn acquire(
        conn: &ConnectionManager,
        key: &str,
        ttl_ms: u64,
    ) -> Result<Option<Lease>, QueueError> {
        let token = Uuid::new_v4().to_string();
        let mut c = conn.clone();
        let acquired: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut c)
            .await?;

        Ok(acquired.map(|_| Lease {
            conn: conn.clone(),
            key: key.to_string(),
            token,
        }))
    }

    /// Release the lease if this instance still holds it.
    pub async fn release(self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let current: Option<String> = redis::AsyncCommands::get(&mut conn, &self.key).await?;
        if current.as_deref() == Some(self.token.as_str()) {
            let _: i64 = redis::AsyncCommands::del(&mut conn, &self.key).await?;
        }
        Ok(())
    }
}
