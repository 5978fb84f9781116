//! Synchronous transport over HTTP, for services in separate processes.
//!
//! Routes served by the receiving side:
//! - `POST {projection}/internal/sync/snapshots`
//! - `POST {authority}/internal/sync/results`
//! - `GET  {authority}/internal/sync/in-progress`

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use relay_core::{
    AuthoritySource, CoreError, SnapshotPublisher, StepResultEvent, StepResultReporter,
    WorkflowSnapshot,
};
use relay_monitoring::SyncMetrics;

use crate::retry::RetryPolicy;

const TRANSPORT: &str = "http";

/// Path of the snapshot receiver on the projection service
pub const SNAPSHOTS_PATH: &str = "/internal/sync/snapshots";
/// Path of the step result receiver on the authority service
pub const RESULTS_PATH: &str = "/internal/sync/results";
/// Path of the in-progress pull on the authority service
pub const IN_PROGRESS_PATH: &str = "/internal/sync/in-progress";

/// Shared HTTP plumbing for the sync transports
#[derive(Debug, Clone)]
pub struct HttpSyncClient {
    base_url: String,
    client: Client,
    timeout: Duration,
    retry: RetryPolicy,
    metrics: Arc<SyncMetrics>,
}

impl HttpSyncClient {
    /// Create a client for the service at `base_url`
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
        metrics: Arc<SyncMetrics>,
    ) -> Result<Self, CoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            timeout,
            retry,
            metrics,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn map_http_error(&self, error: reqwest::Error) -> CoreError {
        if error.is_timeout() {
            CoreError::Timeout(self.timeout.as_millis() as u64)
        } else {
            CoreError::Transport(format!("HTTP error: {}", error))
        }
    }

    async fn check_status(response: Response) -> Result<Response, CoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            Err(CoreError::NotFound(format!("{}: {}", status, body)))
        } else if status.is_client_error() && status != StatusCode::REQUEST_TIMEOUT {
            Err(CoreError::ValidationError(format!("Rejected with {}: {}", status, body)))
        } else {
            Err(CoreError::Transport(format!("Failed with {}: {}", status, body)))
        }
    }

    async fn post<B: Serialize + Sync>(&self, operation: &str, path: &str, body: &B) -> Result<(), CoreError> {
        let url = self.url(path);
        self.retry
            .run(operation, &self.metrics, |attempt| {
                let url = url.clone();
                async move {
                    debug!(url = %url, attempt, "POST");
                    let response = self
                        .client
                        .post(&url)
                        .json(body)
                        .send()
                        .await
                        .map_err(|e| self.map_http_error(e))?;
                    Self::check_status(response).await.map(|_| ())
                }
            })
            .await
    }

    async fn get<T: DeserializeOwned + Send>(&self, operation: &str, path: &str) -> Result<T, CoreError> {
        let url = self.url(path);
        self.retry
            .run(operation, &self.metrics, |attempt| {
                let url = url.clone();
                async move {
                    debug!(url = %url, attempt, "GET");
                    let response = self
                        .client
                        .get(&url)
                        .send()
                        .await
                        .map_err(|e| self.map_http_error(e))?;
                    Self::check_status(response)
                        .await?
                        .json::<T>()
                        .await
                        .map_err(|e| CoreError::SerializationError(format!("Failed to parse response: {}", e)))
                }
            })
            .await
    }
}

/// Pushes snapshots to a remote projection service
#[derive(Debug, Clone)]
pub struct HttpSnapshotPublisher {
    inner: HttpSyncClient,
}

impl HttpSnapshotPublisher {
    /// Publisher targeting the projection service
    pub fn new(projection: HttpSyncClient) -> Self {
        Self { inner: projection }
    }
}

#[async_trait]
impl SnapshotPublisher for HttpSnapshotPublisher {
    async fn push_snapshot(&self, snapshot: WorkflowSnapshot) -> Result<(), CoreError> {
        let started = Instant::now();
        let result = self.inner.post("push_snapshot", SNAPSHOTS_PATH, &snapshot).await;
        self.inner.metrics.record_push(
            snapshot.request_id.0,
            TRANSPORT,
            started.elapsed().as_secs_f64() * 1000.0,
            result.is_ok(),
        );
        result
    }
}

/// Reports step results to a remote authority service
#[derive(Debug, Clone)]
pub struct HttpStepResultReporter {
    inner: HttpSyncClient,
}

impl HttpStepResultReporter {
    /// Reporter targeting the authority service
    pub fn new(authority: HttpSyncClient) -> Self {
        Self { inner: authority }
    }
}

#[async_trait]
impl StepResultReporter for HttpStepResultReporter {
    async fn report_step_result(&self, event: StepResultEvent) -> Result<(), CoreError> {
        let started = Instant::now();
        let result = self.inner.post("report_step_result", RESULTS_PATH, &event).await;
        self.inner.metrics.record_report(
            event.request_id.0,
            TRANSPORT,
            started.elapsed().as_secs_f64() * 1000.0,
            result.is_ok(),
        );
        result
    }
}

/// Pulls in-progress snapshots from a remote authority service
#[derive(Debug, Clone)]
pub struct HttpAuthoritySource {
    inner: HttpSyncClient,
}

impl HttpAuthoritySource {
    /// Source backed by the authority service
    pub fn new(authority: HttpSyncClient) -> Self {
        Self { inner: authority }
    }
}

#[async_trait]
impl AuthoritySource for HttpAuthoritySource {
    async fn fetch_in_progress(&self) -> Result<Vec<WorkflowSnapshot>, CoreError> {
        // Retry happens in the resync coordinator
        let client = HttpSyncClient { retry: RetryPolicy::none(), ..self.inner.clone() };
        client.get("fetch_in_progress", IN_PROGRESS_PATH).await
    }
}
