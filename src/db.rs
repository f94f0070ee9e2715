//! SQLite-backed durable store shared by the engine components.
//!
//! All tables are created idempotently at startup; components issue
//! single-statement atomic operations against the shared pool, never a
//! transaction spanning a whole run.

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

/// Connect to the database, creating the file if missing.
pub async fn connect(url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Create tables and indexes if they do not exist yet.
pub async fn init(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS servers (
            name TEXT PRIMARY KEY,
            url TEXT NOT NULL,
            login TEXT NOT NULL,
            password TEXT NOT NULL,
            timeout_seconds INTEGER NOT NULL,
            chunk_size_bytes INTEGER NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            is_default INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS processed_messages (
            message_uid INTEGER PRIMARY KEY,
            processed_at TEXT NOT NULL,
            outcome TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS run_locks (
            name TEXT PRIMARY KEY,
            holder_id TEXT NOT NULL,
            acquired_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS upload_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            filename TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            server_name TEXT NOT NULL,
            status TEXT NOT NULL,
            error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_upload_logs_timestamp ON upload_logs(timestamp DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_upload_logs_filename ON upload_logs(filename)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_upload_logs_status ON upload_logs(status)")
        .execute(pool)
        .await?;

    info!("Database schema initialized");
    Ok(())
}

/// Lightweight reachability probe for the health endpoint.
pub async fn ping(pool: &SqlitePool) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
