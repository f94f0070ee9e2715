use crate::config::ServerSeed;
use crate::error::{BridgeError, Result};
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{info, warn};

use super::types::{ServerConfig, DEFAULT_CHUNK_SIZE_BYTES, DEFAULT_TIMEOUT_SECONDS};

type ServerRow = (String, String, String, String, i64, i64, bool, bool);

fn row_to_config(row: ServerRow) -> ServerConfig {
    let (name, url, login, password, timeout_seconds, chunk_size_bytes, enabled, is_default) = row;
    ServerConfig {
        name,
        url,
        login,
        password,
        timeout_seconds: timeout_seconds as u64,
        chunk_size_bytes: chunk_size_bytes as u64,
        enabled,
        is_default,
    }
}

const SELECT_COLUMNS: &str =
    "name, url, login, password, timeout_seconds, chunk_size_bytes, enabled, is_default";

#[derive(Clone)]
pub struct ServerRegistry {
    pool: SqlitePool,
}

impl ServerRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The single enabled default target, if one is configured.
    pub async fn resolve_default(&self) -> Result<ServerConfig> {
        let row: Option<ServerRow> = sqlx::query_as(&format!(
            "SELECT {} FROM servers WHERE enabled = 1 AND is_default = 1",
            SELECT_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_config).ok_or(BridgeError::NoServerConfigured)
    }

    pub async fn resolve_by_name(&self, name: &str) -> Result<ServerConfig> {
        let row: Option<ServerRow> = sqlx::query_as(&format!(
            "SELECT {} FROM servers WHERE name = ?",
            SELECT_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_config)
            .ok_or_else(|| BridgeError::NotFound(format!("server '{}'", name)))
    }

    pub async fn list(&self) -> Result<Vec<ServerConfig>> {
        let rows: Vec<ServerRow> = sqlx::query_as(&format!(
            "SELECT {} FROM servers ORDER BY name ASC",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_config).collect())
    }

    /// Insert or update a target. Setting a new enabled default clears the
    /// previous one in the same transaction, keeping the single-default
    /// invariant.
    pub async fn upsert(&self, config: &ServerConfig) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if config.is_default && config.enabled {
            sqlx::query("UPDATE servers SET is_default = 0 WHERE name != ?")
                .bind(&config.name)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO servers (name, url, login, password, timeout_seconds, chunk_size_bytes, enabled, is_default)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                url = excluded.url,
                login = excluded.login,
                password = excluded.password,
                timeout_seconds = excluded.timeout_seconds,
                chunk_size_bytes = excluded.chunk_size_bytes,
                enabled = excluded.enabled,
                is_default = excluded.is_default
            "#,
        )
        .bind(&config.name)
        .bind(&config.url)
        .bind(&config.login)
        .bind(&config.password)
        .bind(config.timeout_seconds as i64)
        .bind(config.chunk_size_bytes as i64)
        .bind(config.enabled)
        .bind(config.is_default)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM servers WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(BridgeError::NotFound(format!("server '{}'", name)));
        }
        Ok(())
    }

    /// Seed the registry from operator-supplied configuration, once.
    ///
    /// A non-empty registry is left untouched so operator edits survive
    /// restarts. The first seed becomes the default target.
    pub async fn seed_if_empty(&self, seeds: &[ServerSeed]) -> Result<()> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM servers")
            .fetch_one(&self.pool)
            .await?;

        if count > 0 {
            return Ok(());
        }
        if seeds.is_empty() {
            warn!("Server registry is empty and no seeds were supplied");
            return Ok(());
        }

        for (i, seed) in seeds.iter().enumerate() {
            let config = ServerConfig {
                name: seed.name.clone(),
                url: seed.url.clone(),
                login: seed.login.clone(),
                password: seed.password.clone(),
                timeout_seconds: seed.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS),
                chunk_size_bytes: seed.chunk_size_bytes.unwrap_or(DEFAULT_CHUNK_SIZE_BYTES),
                enabled: true,
                is_default: i == 0,
            };
            self.upsert(&config).await?;
        }

        info!("Seeded server registry with {} target(s)", seeds.len());
        Ok(())
    }

    /// Probe a target with an authenticated OPTIONS request.
    pub async fn test_connection(&self, config: &ServerConfig) -> Result<()> {
        let client = reqwest::Client::new();
        let response = client
            .request(reqwest::Method::OPTIONS, &config.url)
            .basic_auth(&config.login, Some(&config.password))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || status.is_redirection() {
            Ok(())
        } else {
            Err(BridgeError::Config(format!(
                "server '{}' responded with {}",
                config.name, status
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn seed(name: &str) -> ServerSeed {
        ServerSeed {
            name: name.to_string(),
            url: format!("https://dav.example.com/{}", name),
            login: "user".to_string(),
            password: "pass".to_string(),
            timeout_seconds: None,
            chunk_size_bytes: None,
        }
    }

    #[tokio::test]
    async fn test_seed_once_and_default() {
        let pool = db::testing::memory_pool().await;
        let registry = ServerRegistry::new(pool);

        registry
            .seed_if_empty(&[seed("primary"), seed("secondary")])
            .await
            .unwrap();

        let default = registry.resolve_default().await.unwrap();
        assert_eq!(default.name, "primary");
        assert_eq!(default.timeout_seconds, DEFAULT_TIMEOUT_SECONDS);

        // A second boot must not clobber operator edits.
        registry.seed_if_empty(&[seed("other")]).await.unwrap();
        assert_eq!(registry.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_registry_has_no_default() {
        let pool = db::testing::memory_pool().await;
        let registry = ServerRegistry::new(pool);

        assert!(matches!(
            registry.resolve_default().await,
            Err(BridgeError::NoServerConfigured)
        ));
    }

    #[tokio::test]
    async fn test_upsert_moves_default_atomically() {
        let pool = db::testing::memory_pool().await;
        let registry = ServerRegistry::new(pool);

        let mut a = ServerConfig::new("a", "https://dav.example.com/a", "u", "p");
        a.is_default = true;
        registry.upsert(&a).await.unwrap();

        let mut b = ServerConfig::new("b", "https://dav.example.com/b", "u", "p");
        b.is_default = true;
        registry.upsert(&b).await.unwrap();

        let a = registry.resolve_by_name("a").await.unwrap();
        assert!(!a.is_default);
        assert_eq!(registry.resolve_default().await.unwrap().name, "b");
    }

    #[tokio::test]
    async fn test_resolve_by_name_missing() {
        let pool = db::testing::memory_pool().await;
        let registry = ServerRegistry::new(pool);

        assert!(matches!(
            registry.resolve_by_name("nope").await,
            Err(BridgeError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let pool = db::testing::memory_pool().await;
        let registry = ServerRegistry::new(pool);

        registry.seed_if_empty(&[seed("primary")]).await.unwrap();
        registry.delete("primary").await.unwrap();
        assert!(registry.list().await.unwrap().is_empty());
        assert!(registry.delete("primary").await.is_err());
    }

    #[tokio::test]
    async fn test_disabled_default_not_resolved() {
        let pool = db::testing::memory_pool().await;
        let registry = ServerRegistry::new(pool);

        let mut a = ServerConfig::new("a", "https://dav.example.com/a", "u", "p");
        a.is_default = true;
        a.enabled = false;
        registry.upsert(&a).await.unwrap();

        assert!(matches!(
            registry.resolve_default().await,
            Err(BridgeError::NoServerConfigured)
        ));
    }
}
