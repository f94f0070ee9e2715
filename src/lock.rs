//! Durable run lock with TTL expiry.
//!
//! Triggers arrive from isolated execution contexts with no shared memory,
//! so an in-process mutex cannot serialize them. The lock row in SQLite is
//! the only mutual-exclusion mechanism: acquisition is a single atomic
//! upsert whose affected-row count is the grant signal, never a separate
//! read-then-write. The TTL lets the next run take over after a crashed or
//! hung holder; it must exceed the worst-case run duration with margin.

use crate::error::Result;
use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use tracing::{debug, warn};

const LOCK_NAME: &str = "sync_run";

#[derive(Clone)]
pub struct RunLock {
    pool: SqlitePool,
}

impl RunLock {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Try to take the lock for `holder_id`.
    ///
    /// Succeeds when no lock row exists or the existing row has expired.
    /// Returns `false` when another holder's lock is still live; that is an
    /// expected signal, not an error.
    pub async fn acquire(&self, holder_id: &str, ttl: Duration) -> Result<bool> {
        let now = Utc::now();
        let expires_at = now + ttl;

        let result = sqlx::query(
            r#"
            INSERT INTO run_locks (name, holder_id, acquired_at, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                holder_id = excluded.holder_id,
                acquired_at = excluded.acquired_at,
                expires_at = excluded.expires_at
            WHERE run_locks.expires_at <= excluded.acquired_at
            "#,
        )
        .bind(LOCK_NAME)
        .bind(holder_id)
        .bind(now.to_rfc3339())
        .bind(expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let granted = result.rows_affected() == 1;
        if granted {
            debug!("Run lock acquired by {} until {}", holder_id, expires_at);
        } else {
            debug!("Run lock busy; holder {} denied", holder_id);
        }
        Ok(granted)
    }

    /// Release the lock, but only if `holder_id` still owns it.
    ///
    /// A holder whose TTL already expired must not be able to clear a lock
    /// that has since been taken over.
    pub async fn release(&self, holder_id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM run_locks WHERE name = ? AND holder_id = ?")
            .bind(LOCK_NAME)
            .bind(holder_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            warn!(
                "Run lock release by {} was a no-op; lock expired or taken over",
                holder_id
            );
        } else {
            debug!("Run lock released by {}", holder_id);
        }
        Ok(())
    }
}
