use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub imap: ImapConfig,
    pub sync: SyncConfig,
    pub upload: UploadConfig,
    pub api: ApiConfig,
    /// Remote store seeds, consumed only when the registry is empty.
    #[serde(default)]
    pub servers: Vec<ServerSeed>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    pub listen_addr: String,
    /// Base URL under which this instance can reach itself; used by the
    /// trigger endpoint to dispatch work to the internal worker endpoint.
    pub advertise_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub folder: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Case-insensitive substring a candidate message's subject must contain.
    pub subject_keyword: String,
    pub max_attachment_mb: u64,
    pub max_messages_per_run: u32,
    /// Lock TTL; must exceed the worst-case run duration with margin.
    pub lock_ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    pub retry_count: u32,
    pub retry_delay_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    pub secret_key: String,
    pub internal_key: String,
}

/// One remote store target as supplied by the operator on first boot.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSeed {
    pub name: String,
    pub url: String,
    pub login: String,
    pub password: String,
    pub timeout_seconds: Option<u64>,
    pub chunk_size_bytes: Option<u64>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::Config(e.to_string()))?;

        let mut config: Config =
            toml::from_str(&content).map_err(|e| BridgeError::Config(e.to_string()))?;
        config.apply_env();
        Ok(config)
    }

    /// Secrets may be supplied through the environment instead of the file.
    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("IMAP_PASSWORD") {
            self.imap.password = v;
        }
        if let Ok(v) = std::env::var("API_SECRET_KEY") {
            self.api.secret_key = v;
        }
        if let Ok(v) = std::env::var("INTERNAL_API_KEY") {
            self.api.internal_key = v;
        }
        if let Ok(v) = std::env::var("DATABASE_URL") {
            self.database.url = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync.max_attachment_mb == 0 {
            return Err(BridgeError::Config(
                "sync.max_attachment_mb must be a positive integer".to_string(),
            ));
        }
        if self.sync.max_messages_per_run == 0 {
            return Err(BridgeError::Config(
                "sync.max_messages_per_run must be a positive integer".to_string(),
            ));
        }
        if self.sync.lock_ttl_seconds == 0 {
            return Err(BridgeError::Config(
                "sync.lock_ttl_seconds must be a positive integer".to_string(),
            ));
        }
        if self.sync.subject_keyword.is_empty() {
            return Err(BridgeError::Config(
                "sync.subject_keyword must not be empty".to_string(),
            ));
        }
        if self.api.secret_key.is_empty() || self.api.internal_key.is_empty() {
            return Err(BridgeError::Config(
                "api.secret_key and api.internal_key must be set".to_string(),
            ));
        }

        if self.api.secret_key.len() < 32 {
            warn!("api.secret_key is shorter than 32 characters; use a stronger key");
        }
        if self.api.internal_key.len() < 32 {
            warn!("api.internal_key is shorter than 32 characters; use a stronger key");
        }

        Ok(())
    }

    pub fn max_attachment_bytes(&self) -> u64 {
        self.sync.max_attachment_mb * 1024 * 1024
    }

    pub fn default() -> Self {
        Self {
            http: HttpConfig {
                listen_addr: "0.0.0.0:8080".to_string(),
                advertise_url: None,
            },
            database: DatabaseConfig {
                url: "sqlite://mailbridge.db".to_string(),
            },
            imap: ImapConfig {
                host: "localhost".to_string(),
                port: 993,
                username: String::new(),
                password: String::new(),
                folder: "INBOX".to_string(),
            },
            sync: SyncConfig {
                subject_keyword: "Backup".to_string(),
                max_attachment_mb: 50,
                max_messages_per_run: 10,
                lock_ttl_seconds: 900,
            },
            upload: UploadConfig {
                retry_count: 3,
                retry_delay_seconds: 5,
            },
            api: ApiConfig {
                secret_key: String::new(),
                internal_key: String::new(),
            },
            servers: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.api.secret_key = "0123456789abcdef0123456789abcdef".to_string();
        config.api.internal_key = "fedcba9876543210fedcba9876543210".to_string();
        config
    }

    #[test]
    fn test_default_config_validates_with_keys() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_zero_knobs_rejected() {
        let mut config = valid_config();
        config.sync.max_attachment_mb = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.sync.max_messages_per_run = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_keys_rejected() {
        let mut config = valid_config();
        config.api.secret_key.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_attachment_bytes() {
        let mut config = valid_config();
        config.sync.max_attachment_mb = 2;
        assert_eq!(config.max_attachment_bytes(), 2 * 1024 * 1024);
    }

    #[test]
    fn test_parse_seed_list() {
        let raw = r#"
            [http]
            listen_addr = "127.0.0.1:8080"

            [database]
            url = "sqlite://test.db"

            [imap]
            host = "imap.example.com"
            port = 993
            username = "backup@example.com"
            password = "secret"
            folder = "INBOX"

            [sync]
            subject_keyword = "Backup"
            max_attachment_mb = 50
            max_messages_per_run = 10
            lock_ttl_seconds = 900

            [upload]
            retry_count = 3
            retry_delay_seconds = 5

            [api]
            secret_key = "k1"
            internal_key = "k2"

            [[servers]]
            name = "primary"
            url = "https://dav.example.com/backups"
            login = "dav-user"
            password = "dav-pass"
        "#;

        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0].name, "primary");
        assert!(config.servers[0].timeout_seconds.is_none());
    }
}
