//! WebDAV transfer of attachment bytes to a remote store.

mod client;
mod retry;

pub use client::WebDavUploader;
pub use retry::RetryPolicy;

use async_trait::async_trait;

use crate::error::UploadError;
use crate::mailbox::Attachment;
use crate::registry::ServerConfig;

/// Transfer seam for the orchestrator; tests substitute an in-memory sink.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Transfer one attachment to the given store, returning the remote
    /// path it was stored under.
    ///
    /// A `Transient` error means the bounded retry policy was exhausted;
    /// every other error was terminal on first occurrence.
    async fn upload(
        &self,
        attachment: &Attachment,
        server: &ServerConfig,
    ) -> std::result::Result<String, UploadError>;
}
