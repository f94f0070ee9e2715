//! HTTP surface: trigger, internal worker, health check, audit log reads.

mod handlers;
mod server;

pub use handlers::AppState;
pub use server::ApiServer;
