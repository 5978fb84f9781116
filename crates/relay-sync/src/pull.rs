//! Pull-based resync
//!
//! Used only for cold start: the projection asks the record owner for every
//! in-progress record and rebuilds itself from the answer.

use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use relay_core::{AuthoritySource, CoreError, PendingQueueService, ResyncReport};
use relay_monitoring::{LogExt, SyncMetrics};

use crate::retry::RetryPolicy;

/// Rebuilds a projection from the record owner's current state
pub struct ResyncCoordinator {
    source: Arc<dyn AuthoritySource>,
    projection: Arc<PendingQueueService>,
    retry: RetryPolicy,
    metrics: Arc<SyncMetrics>,
}

impl ResyncCoordinator {
    /// Create a coordinator
    pub fn new(
        source: Arc<dyn AuthoritySource>,
        projection: Arc<PendingQueueService>,
        retry: RetryPolicy,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        Self { source, projection, retry, metrics }
    }

    /// Fetch, then wipe and rebuild the projection.
    ///
    /// The projection is only cleared once the fetch succeeded, so a failed pull
    /// leaves the current entries in place.
    pub async fn resync(&self) -> Result<ResyncReport, CoreError> {
        let started = Instant::now();
        let snapshots = self
            .retry
            .run("fetch_in_progress", &self.metrics, |_| self.source.fetch_in_progress())
            .await?;

        self.projection.clear_all().await?;
        let report = self.projection.resync_from_authority(snapshots).await?;

        self.metrics.record_resync(
            report.received,
            report.indexed,
            started.elapsed().as_secs_f64() * 1000.0,
        );
        Ok(report)
    }

    /// Start-up resync; a failure is logged and the service keeps running
    pub async fn run_at_startup(&self) -> Option<ResyncReport> {
        info!("Starting projection resync");
        self.resync()
            .await
            .log_ok("Projection resync complete")
            .log_err("Projection resync failed, serving from pushes only")
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockall::mock;
    use relay_core::testing::RecordingReporter;
    use relay_core::{
        DeliveryPolicy, PersonId, RequestId, StepSnapshot, StepStatus, WorkflowSnapshot,
    };
    use relay_state_inmemory::InMemoryPendingQueue;

    mock! {
        pub Authority {}

        #[async_trait]
        impl AuthoritySource for Authority {
            async fn fetch_in_progress(&self) -> Result<Vec<WorkflowSnapshot>, CoreError>;
        }
    }

    fn snapshot(request: u64, approver: u64) -> WorkflowSnapshot {
        WorkflowSnapshot {
            request_id: RequestId(request),
            requester_id: PersonId(1),
            title: "Laptop".to_string(),
            content: "16GB".to_string(),
            steps: vec![StepSnapshot {
                step_number: 1,
                approver_id: PersonId(approver),
                status: StepStatus::Pending,
            }],
            version: 1,
        }
    }

    fn projection() -> Arc<PendingQueueService> {
        Arc::new(PendingQueueService::new(
            Arc::new(InMemoryPendingQueue::new()),
            Arc::new(RecordingReporter::default()),
            DeliveryPolicy::default(),
        ))
    }

    #[tokio::test]
    async fn test_resync_replaces_projection_contents() {
        let projection = projection();
        projection.ingest_snapshot(snapshot(99, 7)).await.unwrap();

        let mut authority = MockAuthority::new();
        authority
            .expect_fetch_in_progress()
            .times(1)
            .returning(|| Ok(vec![snapshot(1, 10), snapshot(2, 10), snapshot(3, 11)]));

        let metrics = Arc::new(SyncMetrics::new());
        let coordinator =
            ResyncCoordinator::new(Arc::new(authority), projection.clone(), RetryPolicy::none(), metrics.clone());

        let report = coordinator.resync().await.unwrap();
        assert_eq!(report.received, 3);
        assert_eq!(report.indexed, 3);
        assert_eq!(projection.pending_count().await.unwrap(), 3);
        assert!(projection.list_pending(PersonId(7)).await.unwrap().is_empty());
        assert_eq!(metrics.snapshot().resyncs, 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_existing_entries() {
        let projection = projection();
        projection.ingest_snapshot(snapshot(99, 7)).await.unwrap();

        let mut authority = MockAuthority::new();
        authority
            .expect_fetch_in_progress()
            .times(2)
            .returning(|| Err(CoreError::Transport("connection refused".to_string())));

        let retry = RetryPolicy { max_attempts: 2, initial_backoff_ms: 1, backoff_multiplier: 1.0, max_backoff_ms: 1 };
        let coordinator =
            ResyncCoordinator::new(Arc::new(authority), projection.clone(), retry, Arc::default());

        assert!(coordinator.run_at_startup().await.is_none());
        assert_eq!(projection.list_pending(PersonId(7)).await.unwrap().len(), 1);
    }
}
