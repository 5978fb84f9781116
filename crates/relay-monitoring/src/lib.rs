//! Monitoring module for Relay: structured logging and sync metrics.

use tracing::info;

pub mod logging;
pub mod metrics;

/// Configuration for initializing the monitoring system
#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    /// Service name attached to the startup log line
    pub service_name: String,
    /// Log level filter (e.g., "info,relay_core=debug"), overridden by `RUST_LOG`
    pub log_filter: String,
    /// Emit JSON lines instead of pretty output
    pub enable_json_logging: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            service_name: "relay".to_string(),
            log_filter: "info".to_string(),
            enable_json_logging: false,
        }
    }
}

/// Initialize monitoring system
pub fn init(config: MonitoringConfig) -> anyhow::Result<()> {
    logging::init_logging(&config)?;
    info!(service_name = %config.service_name, "Monitoring initialized");
    Ok(())
}

/// Shutdown the monitoring system
pub fn shutdown() {
    info!("Shutting down monitoring system");
}


// Exported types
pub use crate::logging::{init_logging, init_test_tracing, LogExt};
pub use crate::metrics::{SyncMetrics, SyncMetricsSnapshot};
