use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IMAP error: {0}")]
    Imap(String),

    #[error("Mailbox authentication failed: {0}")]
    MailboxAuth(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("No enabled default server configured")]
    NoServerConfigured,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Outcome taxonomy for a single attachment transfer.
///
/// `Transient` is only returned once the uploader's bounded retry policy is
/// exhausted; every other variant is terminal on the first occurrence.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("transient transfer error: {0}")]
    Transient(String),

    #[error("remote authentication rejected: {0}")]
    Auth(String),

    #[error("remote rejected request: {0}")]
    Client(String),

    #[error("remote storage exhausted")]
    StorageFull,
}

impl UploadError {
    /// Whether a later run could plausibly succeed without operator action.
    pub fn is_transient(&self) -> bool {
        matches!(self, UploadError::Transient(_))
    }
}
