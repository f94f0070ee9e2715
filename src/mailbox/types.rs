use bytes::Bytes;
use chrono::{DateTime, Utc};

/// One mailbox message as seen by the engine.
///
/// The engine never mutates message content; the seen flag is the only
/// thing it touches, and only as a processing signal.
#[derive(Debug, Clone)]
pub struct MailMessage {
    /// Immutable, unique within the mailbox.
    pub uid: u32,
    pub subject: String,
    pub received_at: Option<DateTime<Utc>>,
    /// Declared order is preserved; traversal follows it.
    pub attachments: Vec<Attachment>,
}

/// One attachment, alive only for the duration of a run.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub size_bytes: u64,
    pub content: Bytes,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, content: Bytes) -> Self {
        Self {
            filename: filename.into(),
            size_bytes: content.len() as u64,
            content,
        }
    }
}
