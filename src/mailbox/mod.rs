//! Mailbox access: IMAP transport, MIME attachment extraction, candidate
//! selection.

mod client;
mod extract;
mod scanner;
mod types;

pub use client::ImapMailbox;
pub use extract::{extract_attachments, sanitize_filename};
pub use scanner::{select_candidates, MailSource};
pub use types::{Attachment, MailMessage};
