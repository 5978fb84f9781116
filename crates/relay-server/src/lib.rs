//!
//! Relay Server - HTTP surface and process wiring for Relay
//!
//! One binary hosts the record owner, the pending queue projection, or both,
//! connected by the configured sync transport.

/// API module
pub mod api;

/// External service clients
pub mod clients;

/// Configuration module
pub mod config;

/// Error module
pub mod error;

/// Server module
pub mod server;

// Re-export key types
pub use config::{ServerConfig, ServiceRole, SyncConfig, SyncMode};
pub use error::{ServerError, ServerResult};
pub use server::RelayServer;

/// Validate the configuration, wire the services and serve until shutdown
pub async fn run(config: ServerConfig) -> ServerResult<()> {
    config.validate()?;
    RelayServer::build(config)?.run().await
}
