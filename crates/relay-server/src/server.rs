//! Process wiring for the Relay server
//!
//! A process hosts the record owner, the projection, or both. Which sync
//! transport connects them follows from the configured role and sync mode.

use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use relay_core::{
    AuthoritySource, IdentityDirectory, NotificationDispatcher, PendingQueueService,
    SnapshotPublisher, StatisticsService, StepResultReporter, WorkflowService,
};
use relay_monitoring::SyncMetrics;
use relay_state_inmemory::{InMemoryDirectory, InMemoryStateStoreProvider};
use relay_sync::{
    BusConfig, DirectChannel, HttpAuthoritySource, HttpSnapshotPublisher, HttpStepResultReporter,
    HttpSyncClient, MessageBus, ResyncCoordinator,
};

use crate::clients::{HttpIdentityDirectory, HttpNotificationDispatcher, LoggingNotificationDispatcher};
use crate::config::{ServerConfig, ServiceRole, SyncMode};
use crate::error::{ServerError, ServerResult};

/// Main server implementation
pub struct RelayServer {
    /// Configuration
    pub config: ServerConfig,

    workflows: Option<Arc<WorkflowService>>,
    statistics: Option<Arc<StatisticsService>>,
    projection: Option<Arc<PendingQueueService>>,
    resync: Option<Arc<ResyncCoordinator>>,

    /// Present when the built-in directory backs identity checks
    directory: Option<Arc<InMemoryDirectory>>,

    /// Present in queued mode
    bus: Option<Arc<MessageBus>>,

    metrics: Arc<SyncMetrics>,
}

/// Manual Debug implementation that doesn't try to debug the services
impl std::fmt::Debug for RelayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayServer")
            .field("config", &self.config)
            .field("authority", &self.workflows.is_some())
            .field("projection", &self.projection.is_some())
            .finish()
    }
}

impl RelayServer {
    /// Wire the services for the configured role and sync mode.
    ///
    /// Must be called inside a Tokio runtime; queued mode spawns its consumers.
    pub fn build(config: ServerConfig) -> ServerResult<Self> {
        let store = InMemoryStateStoreProvider::new().with_people(config.directory_seed.clone());
        let directory = config.uses_memory_directory().then(|| store.directory());

        let mut server = Self {
            config,
            workflows: None,
            statistics: None,
            projection: None,
            resync: None,
            directory,
            bus: None,
            metrics: Arc::new(SyncMetrics::new()),
        };

        let sync = server.config.sync.clone();
        match (server.config.role, sync.mode) {
            (ServiceRole::Combined, SyncMode::Direct) => {
                let channel = Arc::new(DirectChannel::new(
                    sync.request_timeout(),
                    sync.retry.clone(),
                    server.metrics.clone(),
                ));
                let workflows = server.host_authority(&store, channel.clone())?;
                let projection = server.host_projection(&store, channel.clone(), workflows.clone());
                channel.bind_result_sink(workflows)?;
                channel.bind_snapshot_sink(projection)?;
            }
            (ServiceRole::Combined, SyncMode::Queued) => {
                let bus = Arc::new(MessageBus::start(
                    BusConfig {
                        partitions: sync.partitions,
                        retry: sync.retry.clone(),
                        ..BusConfig::default()
                    },
                    server.metrics.clone(),
                ));
                let workflows = server.host_authority(&store, bus.clone())?;
                let projection = server.host_projection(&store, bus.clone(), workflows.clone());
                bus.bind_result_sink(workflows)?;
                bus.bind_snapshot_sink(projection)?;
                server.bus = Some(bus);
            }
            (ServiceRole::Authority, SyncMode::Http) => {
                let projection_url = server.config.projection_url.clone().ok_or_else(|| {
                    ServerError::ConfigError("projection_url is required".to_string())
                })?;
                let publisher = HttpSnapshotPublisher::new(server.sync_client(&projection_url)?);
                server.host_authority(&store, Arc::new(publisher))?;
            }
            (ServiceRole::Projection, SyncMode::Http) => {
                let authority_url = server.config.authority_url.clone().ok_or_else(|| {
                    ServerError::ConfigError("authority_url is required".to_string())
                })?;
                let reporter = HttpStepResultReporter::new(server.sync_client(&authority_url)?);
                let source = HttpAuthoritySource::new(server.sync_client(&authority_url)?);
                server.host_projection(&store, Arc::new(reporter), Arc::new(source));
            }
            (role, mode) => {
                return Err(ServerError::ConfigError(format!(
                    "Unsupported role {} with {} sync",
                    role, mode
                )));
            }
        }

        info!(
            role = %server.config.role,
            sync_mode = %sync.mode,
            delivery_policy = %sync.delivery_policy,
            "Relay services wired"
        );
        Ok(server)
    }

    fn sync_client(&self, base_url: &str) -> ServerResult<HttpSyncClient> {
        Ok(HttpSyncClient::new(
            base_url,
            self.config.sync.request_timeout(),
            self.config.sync.retry.clone(),
            self.metrics.clone(),
        )?)
    }

    fn host_authority(
        &mut self,
        store: &InMemoryStateStoreProvider,
        publisher: Arc<dyn SnapshotPublisher>,
    ) -> ServerResult<Arc<WorkflowService>> {
        let timeout = self.config.sync.request_timeout();

        let identity: Arc<dyn IdentityDirectory> = match &self.directory {
            Some(directory) => directory.clone(),
            None => Arc::new(HttpIdentityDirectory::new(&self.config.identity_url, timeout)?),
        };

        let notifier: Arc<dyn NotificationDispatcher> = if self.config.notification_url.starts_with("log://") {
            Arc::new(LoggingNotificationDispatcher)
        } else {
            Arc::new(HttpNotificationDispatcher::new(&self.config.notification_url, timeout)?)
        };

        let records = store.record_repository();
        let workflows = Arc::new(WorkflowService::new(records.clone(), identity, notifier, publisher));
        self.statistics = Some(Arc::new(StatisticsService::new(records)));
        self.workflows = Some(workflows.clone());
        Ok(workflows)
    }

    fn host_projection(
        &mut self,
        store: &InMemoryStateStoreProvider,
        reporter: Arc<dyn StepResultReporter>,
        source: Arc<dyn AuthoritySource>,
    ) -> Arc<PendingQueueService> {
        let projection = Arc::new(PendingQueueService::new(
            store.pending_queue(),
            reporter,
            self.config.sync.delivery_policy,
        ));
        self.resync = Some(Arc::new(ResyncCoordinator::new(
            source,
            projection.clone(),
            self.config.sync.retry.clone(),
            self.metrics.clone(),
        )));
        self.projection = Some(projection.clone());
        projection
    }

    /// Record owner service
    pub fn workflows(&self) -> ServerResult<&Arc<WorkflowService>> {
        self.workflows
            .as_ref()
            .ok_or_else(|| ServerError::Unavailable("approval records are not hosted here".to_string()))
    }

    /// Statistics over the records
    pub fn statistics(&self) -> ServerResult<&Arc<StatisticsService>> {
        self.statistics
            .as_ref()
            .ok_or_else(|| ServerError::Unavailable("approval records are not hosted here".to_string()))
    }

    /// Projection owner service
    pub fn projection(&self) -> ServerResult<&Arc<PendingQueueService>> {
        self.projection
            .as_ref()
            .ok_or_else(|| ServerError::Unavailable("pending queues are not hosted here".to_string()))
    }

    /// Resync coordinator of the projection
    pub fn resync(&self) -> ServerResult<&Arc<ResyncCoordinator>> {
        self.resync
            .as_ref()
            .ok_or_else(|| ServerError::Unavailable("pending queues are not hosted here".to_string()))
    }

    /// Built-in people directory
    pub fn directory(&self) -> ServerResult<&Arc<InMemoryDirectory>> {
        self.directory
            .as_ref()
            .ok_or_else(|| ServerError::Unavailable("the people directory is external".to_string()))
    }

    /// Message bus, only in queued mode
    pub fn bus(&self) -> Option<&Arc<MessageBus>> {
        self.bus.as_ref()
    }

    /// Sync metrics
    pub fn metrics(&self) -> &Arc<SyncMetrics> {
        &self.metrics
    }

    /// Rebuild the projection from the record owner, if this process hosts one
    pub async fn resync_at_startup(&self) {
        if let Some(resync) = &self.resync {
            resync.run_at_startup().await;
        }
    }

    /// Run the server until a shutdown signal
    pub async fn run(self) -> ServerResult<()> {
        info!("Starting Relay server");
        let server = Arc::new(self);
        server.resync_at_startup().await;

        let app = crate::api::build_router(server.clone()).layer(TraceLayer::new_for_http());

        let addr = format!("{}:{}", server.config.bind_address, server.config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("Listening on {}", listener.local_addr()?);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Relay server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
