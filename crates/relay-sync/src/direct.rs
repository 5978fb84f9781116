//! Synchronous call transport
//!
//! The caller blocks until the receiving service has handled the message, so
//! a failure (including a timeout) is visible to the caller immediately.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

use relay_core::{
    CoreError, SnapshotPublisher, SnapshotSink, StepResultEvent, StepResultReporter,
    StepResultSink, WorkflowSnapshot,
};
use relay_monitoring::SyncMetrics;

use crate::endpoints::SyncEndpoints;
use crate::retry::RetryPolicy;

const TRANSPORT: &str = "direct";

/// In-process synchronous sync channel
pub struct DirectChannel {
    endpoints: SyncEndpoints,
    timeout: Duration,
    retry: RetryPolicy,
    metrics: Arc<SyncMetrics>,
}

impl DirectChannel {
    /// Create an unbound channel
    pub fn new(timeout: Duration, retry: RetryPolicy, metrics: Arc<SyncMetrics>) -> Self {
        Self { endpoints: SyncEndpoints::new(), timeout, retry, metrics }
    }

    /// Bind the projection side
    pub fn bind_snapshot_sink(&self, sink: Arc<dyn SnapshotSink>) -> Result<(), CoreError> {
        self.endpoints.bind_snapshot_sink(sink)
    }

    /// Bind the record owner side
    pub fn bind_result_sink(&self, sink: Arc<dyn StepResultSink>) -> Result<(), CoreError> {
        self.endpoints.bind_result_sink(sink)
    }

    async fn with_timeout<F>(&self, call: F) -> Result<(), CoreError>
    where
        F: std::future::Future<Output = Result<(), CoreError>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| CoreError::Timeout(self.timeout.as_millis() as u64))?
    }
}

#[async_trait]
impl SnapshotPublisher for DirectChannel {
    async fn push_snapshot(&self, snapshot: WorkflowSnapshot) -> Result<(), CoreError> {
        let started = Instant::now();
        let request_id = snapshot.request_id.0;

        let result = self
            .retry
            .run("push_snapshot", &self.metrics, |_| {
                let snapshot = snapshot.clone();
                async move {
                    let sink = self.endpoints.snapshot_sink()?;
                    self.with_timeout(sink.receive_snapshot(snapshot)).await
                }
            })
            .await;

        self.metrics.record_push(
            request_id,
            TRANSPORT,
            started.elapsed().as_secs_f64() * 1000.0,
            result.is_ok(),
        );
        result
    }
}

#[async_trait]
impl StepResultReporter for DirectChannel {
    async fn report_step_result(&self, event: StepResultEvent) -> Result<(), CoreError> {
        let started = Instant::now();
        let request_id = event.request_id.0;

        let result = self
            .retry
            .run("report_step_result", &self.metrics, |_| {
                let event = event.clone();
                async move {
                    let sink = self.endpoints.result_sink()?;
                    self.with_timeout(sink.receive_step_result(event)).await
                }
            })
            .await;

        self.metrics.record_report(
            request_id,
            TRANSPORT,
            started.elapsed().as_secs_f64() * 1000.0,
            result.is_ok(),
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{PersonId, RequestId, StepStatus};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct SlowSink;

    #[async_trait]
    impl StepResultSink for SlowSink {
        async fn receive_step_result(&self, _event: StepResultEvent) -> Result<(), CoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    struct FlakySink {
        calls: AtomicU32,
    }

    #[async_trait]
    impl StepResultSink for FlakySink {
        async fn receive_step_result(&self, _event: StepResultEvent) -> Result<(), CoreError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(CoreError::Transport("reset by peer".into()))
            } else {
                Ok(())
            }
        }
    }

    fn event() -> StepResultEvent {
        StepResultEvent {
            request_id: RequestId(1),
            step_number: 1,
            approver_id: PersonId(10),
            status: StepStatus::Approved,
            comment: None,
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy { max_attempts: 2, initial_backoff_ms: 1, backoff_multiplier: 1.0, max_backoff_ms: 1 }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_caller_visible() {
        let channel = DirectChannel::new(Duration::from_millis(200), RetryPolicy::none(), Arc::default());
        channel.bind_result_sink(Arc::new(SlowSink)).unwrap();

        let err = channel.report_step_result(event()).await.unwrap_err();
        assert_eq!(err, CoreError::Timeout(200));
    }

    #[tokio::test]
    async fn test_unbound_channel_is_a_transport_error() {
        let metrics = Arc::new(SyncMetrics::new());
        let channel = DirectChannel::new(Duration::from_secs(1), RetryPolicy::none(), metrics.clone());

        let err = channel.report_step_result(event()).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(metrics.snapshot().reports_failed, 1);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let metrics = Arc::new(SyncMetrics::new());
        let channel = DirectChannel::new(Duration::from_secs(1), policy(), metrics.clone());
        channel.bind_result_sink(Arc::new(FlakySink { calls: AtomicU32::new(0) })).unwrap();

        channel.report_step_result(event()).await.unwrap();
        let counters = metrics.snapshot();
        assert_eq!(counters.retries, 1);
        assert_eq!(counters.reports_ok, 1);
    }

    #[tokio::test]
    async fn test_sink_can_only_be_bound_once() {
        let channel = DirectChannel::new(Duration::from_secs(1), RetryPolicy::none(), Arc::default());
        channel.bind_result_sink(Arc::new(SlowSink)).unwrap();
        assert!(channel.bind_result_sink(Arc::new(SlowSink)).is_err());
    }
}
