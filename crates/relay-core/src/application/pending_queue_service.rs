use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::sync_channel::{DeliveryPolicy, SnapshotSink, StepResultReporter};
use crate::domain::repository::{IngestOutcome, PendingQueueStore};
use crate::domain::snapshot::{StepResultEvent, WorkflowSnapshot};
use crate::types::{PersonId, RequestId, StepNumber, StepStatus};
use crate::CoreError;

/// Counts from a bulk resync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResyncReport {
    /// Snapshots received
    pub received: usize,
    /// Snapshots indexed under an approver
    pub indexed: usize,
    /// Snapshots with no pending step
    pub dropped: usize,
    /// Snapshots older than one already seen
    pub stale: usize,
}

/// Projection owner: the per-approver pending queue
pub struct PendingQueueService {
    store: Arc<dyn PendingQueueStore>,
    reporter: Arc<dyn StepResultReporter>,
    policy: DeliveryPolicy,
}

impl PendingQueueService {
    /// Create a new pending queue service
    pub fn new(
        store: Arc<dyn PendingQueueStore>,
        reporter: Arc<dyn StepResultReporter>,
        policy: DeliveryPolicy,
    ) -> Self {
        Self { store, reporter, policy }
    }

    /// Delivery policy in effect
    pub fn policy(&self) -> DeliveryPolicy {
        self.policy
    }

    /// Index a snapshot under its actionable approver, superseding any earlier
    /// entry for the same request
    pub async fn ingest_snapshot(&self, snapshot: WorkflowSnapshot) -> Result<IngestOutcome, CoreError> {
        let request_id = snapshot.request_id;
        let version = snapshot.version;
        let approver_id = snapshot.actionable_approver();

        let outcome = self.store.apply_snapshot(approver_id, snapshot).await?;
        match outcome {
            IngestOutcome::Indexed { approver_id, replaced } => debug!(
                request_id = %request_id,
                version,
                approver_id = %approver_id,
                replaced = ?replaced,
                "Indexed pending approval"
            ),
            IngestOutcome::Dropped { replaced } => debug!(
                request_id = %request_id,
                version,
                replaced = ?replaced,
                "Snapshot has no pending step, dropped"
            ),
            IngestOutcome::Stale { latest_version } => debug!(
                request_id = %request_id,
                version,
                latest_version,
                "Ignoring stale snapshot"
            ),
        }
        Ok(outcome)
    }

    /// Pending snapshots for an approver, possibly empty
    pub async fn list_pending(&self, approver_id: PersonId) -> Result<Vec<WorkflowSnapshot>, CoreError> {
        self.store.list(approver_id).await
    }

    /// Record an approver's decision and report it to the record owner.
    ///
    /// Under [`DeliveryPolicy::CommitThenSend`] the entry is gone even if the
    /// report fails; the failure is still returned. Under
    /// [`DeliveryPolicy::SendThenCommit`] a failed report keeps the entry.
    pub async fn record_decision(
        &self,
        approver_id: PersonId,
        request_id: RequestId,
        status: &str,
        comment: Option<String>,
    ) -> Result<StepResultEvent, CoreError> {
        let snapshot = self
            .store
            .get(approver_id, request_id)
            .await?
            .ok_or(CoreError::PendingEntryNotFound { approver_id, request_id })?;

        let status: StepStatus = status.parse()?;
        if !status.is_decision() {
            return Err(CoreError::InvalidStatus(status.to_string()));
        }

        let step_number = Self::resolve_step(&snapshot, approver_id);
        let event = StepResultEvent { request_id, step_number, approver_id, status, comment };

        match self.policy {
            DeliveryPolicy::CommitThenSend => {
                // A concurrent decision may have taken the entry since the lookup
                self.store
                    .remove(approver_id, request_id)
                    .await?
                    .ok_or(CoreError::PendingEntryNotFound { approver_id, request_id })?;

                if let Err(e) = self.reporter.report_step_result(event.clone()).await {
                    warn!(
                        request_id = %request_id,
                        approver_id = %approver_id,
                        error = %e,
                        "Decision removed locally but not delivered"
                    );
                    return Err(e);
                }
            }
            DeliveryPolicy::SendThenCommit => {
                self.reporter.report_step_result(event.clone()).await.map_err(|e| {
                    warn!(
                        request_id = %request_id,
                        approver_id = %approver_id,
                        error = %e,
                        "Decision not delivered, entry kept"
                    );
                    e
                })?;
                self.store.remove(approver_id, request_id).await?;
            }
        }

        info!(
            request_id = %request_id,
            approver_id = %approver_id,
            step = step_number,
            status = %status,
            policy = %self.policy,
            "Recorded decision"
        );
        Ok(event)
    }

    fn resolve_step(snapshot: &WorkflowSnapshot, approver_id: PersonId) -> StepNumber {
        snapshot.pending_step_for(approver_id).unwrap_or_else(|| {
            warn!(
                request_id = %snapshot.request_id,
                approver_id = %approver_id,
                "No pending step for approver in cached snapshot, falling back to step 1"
            );
            1
        })
    }

    /// Wipe the projection, including remembered snapshot versions
    pub async fn clear_all(&self) -> Result<(), CoreError> {
        self.store.clear().await?;
        info!("Cleared pending queue projection");
        Ok(())
    }

    /// Ingest every snapshot of a full pull
    pub async fn resync_from_authority(
        &self,
        snapshots: Vec<WorkflowSnapshot>,
    ) -> Result<ResyncReport, CoreError> {
        let mut report = ResyncReport { received: snapshots.len(), ..Default::default() };
        for snapshot in snapshots {
            match self.ingest_snapshot(snapshot).await? {
                IngestOutcome::Indexed { .. } => report.indexed += 1,
                IngestOutcome::Dropped { .. } => report.dropped += 1,
                IngestOutcome::Stale { .. } => report.stale += 1,
            }
        }
        info!(
            received = report.received,
            indexed = report.indexed,
            dropped = report.dropped,
            stale = report.stale,
            "Resynced pending queue from authority"
        );
        Ok(report)
    }

    /// Entries across every approver
    pub async fn pending_count(&self) -> Result<usize, CoreError> {
        self.store.len().await
    }
}

#[async_trait]
impl SnapshotSink for PendingQueueService {
    async fn receive_snapshot(&self, snapshot: WorkflowSnapshot) -> Result<(), CoreError> {
        self.ingest_snapshot(snapshot).await.map(|_| ())
    }
}
