//! Append-only audit trail of attachment transfer attempts.

use crate::error::{BridgeError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::debug;

/// Terminal status of one attachment-transfer attempt set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Failed,
    Skipped,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Success => "success",
            LogStatus::Failed => "failed",
            LogStatus::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub filename: String,
    pub size_bytes: i64,
    pub server_name: String,
    pub status: String,
    pub error_message: Option<String>,
}

#[derive(Clone)]
pub struct LogRecorder {
    pool: SqlitePool,
}

impl LogRecorder {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one outcome record. Entries are never mutated afterwards.
    pub async fn record(
        &self,
        filename: &str,
        size_bytes: u64,
        server_name: &str,
        status: LogStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO upload_logs (timestamp, filename, size_bytes, server_name, status, error_message)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(filename)
        .bind(size_bytes as i64)
        .bind(server_name)
        .bind(status.as_str())
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        debug!(
            "Recorded {} for '{}' ({} bytes) on '{}'",
            status.as_str(),
            filename,
            size_bytes,
            server_name
        );
        Ok(())
    }

    /// Newest entries first, optionally filtered by filename substring.
    pub async fn recent(
        &self,
        page: u32,
        per_page: u32,
        filename_filter: Option<&str>,
    ) -> Result<Vec<LogEntry>> {
        let offset = (page.saturating_sub(1) as i64) * per_page as i64;
        let pattern = filename_filter.map(|q| format!("%{}%", q));

        let rows: Vec<(i64, String, String, i64, String, String, Option<String>)> = match &pattern {
            Some(p) => {
                sqlx::query_as(
                    r#"
                    SELECT id, timestamp, filename, size_bytes, server_name, status, error_message
                    FROM upload_logs
                    WHERE filename LIKE ?
                    ORDER BY timestamp DESC, id DESC
                    LIMIT ? OFFSET ?
                    "#,
                )
                .bind(p)
                .bind(per_page as i64)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT id, timestamp, filename, size_bytes, server_name, status, error_message
                    FROM upload_logs
                    ORDER BY timestamp DESC, id DESC
                    LIMIT ? OFFSET ?
                    "#,
                )
                .bind(per_page as i64)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter()
            .map(|(id, timestamp, filename, size_bytes, server_name, status, error_message)| {
                Ok(LogEntry {
                    id,
                    timestamp: DateTime::parse_from_rfc3339(&timestamp)
                        .map_err(|e| BridgeError::Parse(e.to_string()))?
                        .with_timezone(&Utc),
                    filename,
                    size_bytes,
                    server_name,
                    status,
                    error_message,
                })
            })
            .collect()
    }

    pub async fn count(&self, filename_filter: Option<&str>) -> Result<i64> {
        let (count,): (i64,) = match filename_filter {
            Some(q) => {
                sqlx::query_as("SELECT COUNT(*) FROM upload_logs WHERE filename LIKE ?")
                    .bind(format!("%{}%", q))
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as("SELECT COUNT(*) FROM upload_logs")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count)
    }

    /// Per-status totals for the dashboard's statistics view.
    pub async fn count_by_status(&self, status: LogStatus) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM upload_logs WHERE status = ?")
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn test_record_and_read_back() {
        let pool = db::testing::memory_pool().await;
        let recorder = LogRecorder::new(pool);

        recorder
            .record("report.pdf", 2048, "primary", LogStatus::Success, None)
            .await
            .unwrap();
        recorder
            .record("huge.iso", 99_999_999, "primary", LogStatus::Skipped, Some("exceeds size limit"))
            .await
            .unwrap();

        let entries = recorder.recent(1, 20, None).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(recorder.count(None).await.unwrap(), 2);
        assert_eq!(recorder.count_by_status(LogStatus::Success).await.unwrap(), 1);
        assert_eq!(recorder.count_by_status(LogStatus::Skipped).await.unwrap(), 1);
        assert_eq!(recorder.count_by_status(LogStatus::Failed).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_filename_filter_and_pagination() {
        let pool = db::testing::memory_pool().await;
        let recorder = LogRecorder::new(pool);

        for i in 0..5 {
            recorder
                .record(&format!("backup-{}.tar", i), 100, "primary", LogStatus::Success, None)
                .await
                .unwrap();
        }
        recorder
            .record("notes.txt", 10, "primary", LogStatus::Failed, Some("410 Gone"))
            .await
            .unwrap();

        assert_eq!(recorder.count(Some("backup")).await.unwrap(), 5);
        assert_eq!(recorder.count(Some("notes")).await.unwrap(), 1);

        let page1 = recorder.recent(1, 2, Some("backup")).await.unwrap();
        let page2 = recorder.recent(2, 2, Some("backup")).await.unwrap();
        assert_eq!(page1.len(), 2);
        assert_eq!(page2.len(), 2);
        assert_ne!(page1[0].id, page2[0].id);

        let failed = recorder.recent(1, 20, Some("notes")).await.unwrap();
        assert_eq!(failed[0].error_message.as_deref(), Some("410 Gone"));
    }
}
