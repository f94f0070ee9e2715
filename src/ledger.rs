//! Durable record of mailbox messages that have already been handled.
//!
//! A uid's presence here is the sole authority preventing reprocessing; the
//! mailbox's own seen flag is a secondary, best-effort signal that may fail
//! to persist.

use crate::error::Result;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

#[derive(Clone)]
pub struct ProcessedLedger {
    pool: SqlitePool,
}

impl ProcessedLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Whether `uid` has already been processed.
    pub async fn contains(&self, uid: u32) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM processed_messages WHERE message_uid = ?")
                .bind(uid as i64)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Record `uid` as processed. Inserting an already-present uid is a
    /// no-op; the first record wins.
    pub async fn mark_processed(&self, uid: u32, outcome: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO processed_messages (message_uid, processed_at, outcome)
            VALUES (?, ?, ?)
            ON CONFLICT(message_uid) DO NOTHING
            "#,
        )
        .bind(uid as i64)
        .bind(Utc::now().to_rfc3339())
        .bind(outcome)
        .execute(&self.pool)
        .await?;

        debug!("Marked uid {} as processed ({})", uid, outcome);
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM processed_messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
