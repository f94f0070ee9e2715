use serde::{Deserialize, Serialize};

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_CHUNK_SIZE_BYTES: u64 = 1024 * 1024;

/// One configured remote store target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Unique key; enforced on write.
    pub name: String,
    pub url: String,
    pub login: String,
    pub password: String,
    pub timeout_seconds: u64,
    pub chunk_size_bytes: u64,
    pub enabled: bool,
    pub is_default: bool,
}

impl ServerConfig {
    pub fn new(name: &str, url: &str, login: &str, password: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            login: login.to_string(),
            password: password.to_string(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
            enabled: true,
            is_default: false,
        }
    }
}
