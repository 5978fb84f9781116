//! Configuration for the Relay server
//!
//! Loaded from an optional TOML file (`RELAY_CONFIG`, default `relay.toml`)
//! overridden by `RELAY_*` environment variables, nested keys separated by
//! `__` (for example `RELAY_SYNC__MODE=queued`).

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use relay_core::{DeliveryPolicy, Person};
use relay_sync::RetryPolicy;

use crate::error::{ServerError, ServerResult};

/// Which services this process hosts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceRole {
    /// Record owner only
    Authority,
    /// Pending queue projection only
    Projection,
    /// Both, in one process
    #[default]
    Combined,
}

impl ServiceRole {
    /// Hosts the record owner
    pub fn has_authority(&self) -> bool {
        matches!(self, ServiceRole::Authority | ServiceRole::Combined)
    }

    /// Hosts the projection
    pub fn has_projection(&self) -> bool {
        matches!(self, ServiceRole::Projection | ServiceRole::Combined)
    }
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceRole::Authority => f.write_str("authority"),
            ServiceRole::Projection => f.write_str("projection"),
            ServiceRole::Combined => f.write_str("combined"),
        }
    }
}

/// Transport between record owner and projection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// In-process synchronous call
    #[default]
    Direct,
    /// In-process partitioned bus
    Queued,
    /// Synchronous HTTP between processes
    Http,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Direct => f.write_str("direct"),
            SyncMode::Queued => f.write_str("queued"),
            SyncMode::Http => f.write_str("http"),
        }
    }
}

/// Sync channel settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Transport
    #[serde(default)]
    pub mode: SyncMode,

    /// Order of local removal and report when a decision is recorded
    #[serde(default)]
    pub delivery_policy: DeliveryPolicy,

    /// Partitions of the queued bus
    #[serde(default = "default_partitions")]
    pub partitions: usize,

    /// Timeout of a synchronous call
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Retry of transient failures
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_partitions() -> usize {
    3
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::default(),
            delivery_policy: DeliveryPolicy::default(),
            partitions: default_partitions(),
            request_timeout_ms: default_request_timeout_ms(),
            retry: RetryPolicy::default(),
        }
    }
}

impl SyncConfig {
    /// Timeout as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host to bind to
    #[serde(default = "default_host")]
    pub bind_address: String,

    /// Log filter, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON log lines
    #[serde(default)]
    pub json_logs: bool,

    /// Services hosted by this process
    #[serde(default)]
    pub role: ServiceRole,

    /// Sync channel
    #[serde(default)]
    pub sync: SyncConfig,

    /// Base URL of the authority, needed by a projection using HTTP sync
    #[serde(default)]
    pub authority_url: Option<String>,

    /// Base URL of the projection, needed by an authority using HTTP sync
    #[serde(default)]
    pub projection_url: Option<String>,

    /// Identity service, `memory://` for the built-in directory
    #[serde(default = "default_identity_url")]
    pub identity_url: String,

    /// Notification service, `log://` to only log outcomes
    #[serde(default = "default_notification_url")]
    pub notification_url: String,

    /// People loaded into the built-in directory
    #[serde(default)]
    pub directory_seed: Vec<Person>,
}

fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_identity_url() -> String {
    "memory://".to_string()
}

fn default_notification_url() -> String {
    "log://".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_host(),
            log_level: default_log_level(),
            json_logs: false,
            role: ServiceRole::default(),
            sync: SyncConfig::default(),
            authority_url: None,
            projection_url: None,
            identity_url: default_identity_url(),
            notification_url: default_notification_url(),
            directory_seed: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load from the config file and environment.
    ///
    /// Runs before logging is set up, so [`ServerConfig::validate`] is left to
    /// the caller.
    pub fn load() -> ServerResult<Self> {
        let path = env::var("RELAY_CONFIG").unwrap_or_else(|_| "relay.toml".to_string());
        let config = config::Config::builder()
            .add_source(config::File::from(Path::new(&path)).required(false))
            .add_source(
                config::Environment::with_prefix("RELAY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Reject combinations the server cannot wire
    pub fn validate(&self) -> ServerResult<()> {
        if self.sync.partitions == 0 {
            return Err(ServerError::ConfigError("sync.partitions must be at least 1".to_string()));
        }
        if self.sync.request_timeout_ms == 0 {
            return Err(ServerError::ConfigError("sync.request_timeout_ms must be positive".to_string()));
        }

        match (self.role, self.sync.mode) {
            (ServiceRole::Combined, SyncMode::Http) => {
                return Err(ServerError::ConfigError(
                    "HTTP sync needs separate authority and projection processes".to_string(),
                ));
            }
            (ServiceRole::Authority | ServiceRole::Projection, SyncMode::Direct | SyncMode::Queued) => {
                return Err(ServerError::ConfigError(format!(
                    "{} sync only works with the combined role",
                    self.sync.mode
                )));
            }
            (ServiceRole::Authority, SyncMode::Http) if self.projection_url.is_none() => {
                return Err(ServerError::ConfigError(
                    "projection_url is required for an authority using HTTP sync".to_string(),
                ));
            }
            (ServiceRole::Projection, SyncMode::Http) if self.authority_url.is_none() => {
                return Err(ServerError::ConfigError(
                    "authority_url is required for a projection using HTTP sync".to_string(),
                ));
            }
            _ => {}
        }

        info!(role = %self.role, sync_mode = %self.sync.mode, "Validated server configuration");

        if self.role.has_authority() {
            if self.identity_url.starts_with("memory://") && self.directory_seed.is_empty() {
                warn!("Built-in directory is empty - every workflow creation will be rejected!");
            }
            if self.notification_url.starts_with("log://") {
                warn!("No notification service configured - outcomes will only be logged");
            }
        }

        Ok(())
    }

    /// Whether the built-in directory backs identity checks
    pub fn uses_memory_directory(&self) -> bool {
        self.identity_url.starts_with("memory://")
    }
}
