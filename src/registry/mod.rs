//! Remote store registry: configured WebDAV targets and the active default.

mod manager;
mod types;

pub use manager::ServerRegistry;
pub use types::ServerConfig;
