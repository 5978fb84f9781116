use anyhow::{Context, Result};
use relay_monitoring::MonitoringConfig;
use relay_server::config::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration from the config file and environment variables
    let config = ServerConfig::load().context("Failed to load configuration")?;

    // Set up monitoring
    let monitoring_config = MonitoringConfig {
        service_name: format!("relay-{}", config.role),
        log_filter: config.log_level.clone(),
        enable_json_logging: config.json_logs,
    };
    relay_monitoring::init(monitoring_config).context("Failed to initialize monitoring")?;

    relay_server::run(config).await.context("Server error")?;

    relay_monitoring::shutdown();
    Ok(())
}
