// Relay E2E Tests
//
// Wires a record owner and a pending queue projection in one process, the way
// the combined server role does, so scenarios can drive both sides directly.

use std::sync::Arc;
use std::time::Duration;

use relay_core::testing::{RecordingNotifier, RecordingReporter};
use relay_core::{
    CoreError, DeliveryPolicy, NewWorkflow, PendingQueueService, Person, PersonId, RequestId,
    SnapshotPublisher, StepRequest, StepResultEvent, StepResultReporter, WorkflowService,
};
use relay_monitoring::SyncMetrics;
use relay_state_inmemory::{InMemoryPendingQueue, InMemoryStateStoreProvider};
use relay_sync::{BusConfig, DirectChannel, MessageBus, ResyncCoordinator, RetryPolicy};

/// People known to the directory
pub const REQUESTER: u64 = 1;
pub const APPROVER_A: u64 = 10;
pub const APPROVER_B: u64 = 20;
pub const APPROVER_C: u64 = 30;

/// Timeout of a direct sync call
pub const SYNC_TIMEOUT_MS: u64 = 2_000;

/// In-process transport between the two services
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Synchronous in-process call
    Direct,
    /// Partitioned asynchronous bus
    Queued,
}

/// Both services plus the transport that connects them
pub struct RelayHarness {
    pub workflows: Arc<WorkflowService>,
    pub projection: Arc<PendingQueueService>,
    pub notifier: Arc<RecordingNotifier>,
    pub metrics: Arc<SyncMetrics>,
    bus: Option<Arc<MessageBus>>,
}

fn people() -> Vec<Person> {
    [REQUESTER, APPROVER_A, APPROVER_B, APPROVER_C]
        .into_iter()
        .map(|id| Person { id: PersonId(id), name: format!("person-{}", id), manager_id: None })
        .collect()
}

fn wire(
    store: &InMemoryStateStoreProvider,
    notifier: Arc<RecordingNotifier>,
    publisher: Arc<dyn SnapshotPublisher>,
    reporter: Arc<dyn StepResultReporter>,
) -> (Arc<WorkflowService>, Arc<PendingQueueService>) {
    let workflows = Arc::new(WorkflowService::new(
        store.record_repository(),
        store.directory(),
        notifier,
        publisher,
    ));
    let projection = Arc::new(PendingQueueService::new(
        store.pending_queue(),
        reporter,
        DeliveryPolicy::CommitThenSend,
    ));
    (workflows, projection)
}

impl RelayHarness {
    /// Wire both services over `transport`. Must run inside a Tokio runtime.
    pub fn start(transport: Transport) -> Result<Self, CoreError> {
        match transport {
            Transport::Direct => Self::start_direct(),
            Transport::Queued => {
                Self::start_queued(BusConfig { retry: RetryPolicy::none(), ..BusConfig::default() })
            }
        }
    }

    fn start_direct() -> Result<Self, CoreError> {
        let store = InMemoryStateStoreProvider::new().with_people(people());
        let notifier = Arc::new(RecordingNotifier::default());
        let metrics = Arc::new(SyncMetrics::new());

        let channel = Arc::new(DirectChannel::new(
            Duration::from_millis(SYNC_TIMEOUT_MS),
            RetryPolicy::none(),
            metrics.clone(),
        ));
        let (workflows, projection) = wire(&store, notifier.clone(), channel.clone(), channel.clone());
        channel.bind_result_sink(workflows.clone())?;
        channel.bind_snapshot_sink(projection.clone())?;

        Ok(Self { workflows, projection, notifier, metrics, bus: None })
    }

    /// Wire both services over a bus with the given settings
    pub fn start_queued(config: BusConfig) -> Result<Self, CoreError> {
        let store = InMemoryStateStoreProvider::new().with_people(people());
        let notifier = Arc::new(RecordingNotifier::default());
        let metrics = Arc::new(SyncMetrics::new());

        let bus = Arc::new(MessageBus::start(config, metrics.clone()));
        let (workflows, projection) = wire(&store, notifier.clone(), bus.clone(), bus.clone());
        bus.bind_result_sink(workflows.clone())?;
        bus.bind_snapshot_sink(projection.clone())?;

        Ok(Self { workflows, projection, notifier, metrics, bus: Some(bus) })
    }

    /// Wait until every published message has been handled
    pub async fn settle(&self) {
        if let Some(bus) = &self.bus {
            bus.wait_idle().await;
        }
    }

    /// Submit a workflow from [`REQUESTER`] with `(step, approver)` pairs
    pub async fn submit(&self, steps: &[(u32, u64)]) -> Result<RequestId, CoreError> {
        let record = self
            .workflows
            .create(NewWorkflow {
                requester_id: PersonId(REQUESTER),
                title: "Travel request".to_string(),
                content: "Two days on site".to_string(),
                steps: steps.iter().map(|(n, a)| StepRequest::new(*n, PersonId(*a))).collect(),
            })
            .await?;
        self.settle().await;
        Ok(record.request_id)
    }

    /// Record a decision through the projection and let it propagate
    pub async fn decide(
        &self,
        approver: u64,
        request_id: RequestId,
        status: &str,
    ) -> Result<StepResultEvent, CoreError> {
        let result = self.projection.record_decision(PersonId(approver), request_id, status, None).await;
        self.settle().await;
        result
    }

    /// Request ids pending for `approver`, in listing order
    pub async fn pending_ids(&self, approver: u64) -> Result<Vec<RequestId>, CoreError> {
        pending_ids(&self.projection, approver).await
    }

    /// A projection started from nothing, as after a restart, with a
    /// coordinator pulling from this harness's record owner
    pub fn restarted_projection(&self) -> (Arc<PendingQueueService>, ResyncCoordinator) {
        let projection = Arc::new(PendingQueueService::new(
            Arc::new(InMemoryPendingQueue::new()),
            Arc::new(RecordingReporter::default()),
            DeliveryPolicy::CommitThenSend,
        ));
        let coordinator = ResyncCoordinator::new(
            self.workflows.clone(),
            projection.clone(),
            RetryPolicy::none(),
            self.metrics.clone(),
        );
        (projection, coordinator)
    }
}

/// Request ids pending for `approver` on any projection
pub async fn pending_ids(projection: &PendingQueueService, approver: u64) -> Result<Vec<RequestId>, CoreError> {
    Ok(projection
        .list_pending(PersonId(approver))
        .await?
        .into_iter()
        .map(|s| s.request_id)
        .collect())
}
