//! mailbridge: IMAP to WebDAV attachment bridge
//!
//! Watches a mailbox for unread messages whose subject matches a configured
//! keyword, extracts their attachments and uploads each to a configured
//! WebDAV store, recording every outcome for later audit.
//!
//! The core is the synchronization engine: a durable run lock guarantees
//! at-most-one active run across isolated triggers, and a processed-message
//! ledger guarantees each message is handled exactly once even when runs
//! overlap or the mailbox's seen flag fails to persist.
//!
//! # Modules
//!
//! - [`config`]: Configuration management
//! - [`error`]: Error types and handling
//! - [`db`]: SQLite store setup
//! - [`lock`]: Durable run lock with TTL
//! - [`ledger`]: Processed-message ledger
//! - [`registry`]: Remote store registry
//! - [`audit`]: Upload audit trail
//! - [`mailbox`]: IMAP access and attachment extraction
//! - [`webdav`]: Chunked uploads with bounded retry
//! - [`sync`]: Run orchestration
//! - [`api`]: HTTP trigger and read surfaces

pub mod api;
pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod lock;
pub mod mailbox;
pub mod registry;
pub mod sync;
pub mod webdav;

// Re-export commonly used types
pub use config::Config;
pub use error::{BridgeError, Result};
